use anyhow::Result;
use std::io::{stdout, Stdout, Write};
use crossterm::ExecutableCommand;
use crossterm::terminal::{self, Clear};
use crossterm::style::{Color, SetForegroundColor};

use crate::kb_service::RetrievedDoc;

#[derive(Debug)]
pub struct TerminalService {
    stdout: Stdout
}

impl TerminalService {

    pub fn new() -> Self {
        return Self {
            stdout: stdout()
        }
    }

    pub fn delete_char(&mut self) -> Result<()> {
        write!(self.stdout, "\x08 \x08")?;
        self.stdout.flush()?;
        Ok(())
    }

    pub fn clear_line(&mut self) -> Result<()> {
        self.stdout.execute(Clear(terminal::ClearType::CurrentLine))?;
        Ok(())
    }

    pub fn log_assistant(&mut self, text: &str) -> Result<()>{
        self.log_assistant_header()?;
        self.stdout.execute(SetForegroundColor(Color::Blue))?;
        writeln!(self.stdout, "{}", text)?;
        Ok(())
    }

    pub fn log_assistant_header(&mut self) -> Result<()>{
        writeln!(self.stdout, "\x1b[0;90mAssistant:\r")?;
        Ok(())
    }

    /// One streamed text delta, echoed without a trailing newline.
    pub fn stream_chunk(&mut self, text: &str) -> Result<()>{
        self.stdout.execute(SetForegroundColor(Color::Blue))?;
        write!(self.stdout, "{}", text)?;
        self.stdout.flush()?;
        Ok(())
    }

    pub fn end_stream(&mut self) -> Result<()>{
        writeln!(self.stdout)?;
        Ok(())
    }

    pub fn log_user_inline(&mut self, c: &char) -> Result<()>{
        self.stdout.execute(SetForegroundColor(Color::Green))?;
        write!(self.stdout, "{}", &c)?;
        self.stdout.flush()?;
        Ok(())
    }

    pub fn log_error(&mut self, text: &str) -> Result<()>{
        self.stdout.execute(SetForegroundColor(Color::Red))?;
        writeln!(self.stdout, "{}", text)?;
        Ok(())
    }

    pub fn log_info(&mut self, text: &str) -> Result<()>{
        writeln!(self.stdout, "\x1b[0;90m{}", text)?;
        Ok(())
    }

    pub fn log_info_inline(&mut self, text: &str) -> Result<()>{
        write!(self.stdout, "\x1b[0;90m{}", text)?;
        self.stdout.flush()?;
        Ok(())
    }

    /// Knowledge-base hits echoed after an answer, highest score first as
    /// returned by the retrieval service.
    pub fn log_sources(&mut self, docs: &[RetrievedDoc]) -> Result<()>{
        if docs.is_empty() {
            return Ok(());
        }
        writeln!(self.stdout, "\x1b[0;90mKnowledge base sources ({}):\r", docs.len())?;
        for (index, doc) in docs.iter().enumerate() {
            let preview: String = doc.text.chars().take(200).collect();
            writeln!(self.stdout, "\x1b[0;90m  Document {} (score: {:.2}): {}", index + 1, doc.score, preview)?;
            writeln!(self.stdout, "\x1b[0;90m  Source: {}", doc.location)?;
        }
        Ok(())
    }

}
