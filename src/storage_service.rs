use anyhow::{bail, Result};

/// Splits an `s3://bucket/prefix` uri into bucket and prefix. The prefix may
/// be empty when the uri names only a bucket.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let remainder = match uri.strip_prefix("s3://") {
        Some(remainder) => remainder,
        None => bail!("output location must start with s3://, got {uri}"),
    };
    let (bucket, prefix) = match remainder.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (remainder, ""),
    };
    if bucket.is_empty() {
        bail!("output location {uri} has no bucket name");
    }
    Ok((bucket.to_owned(), prefix.trim_end_matches('/').to_owned()))
}

/// Looks for the finished `.mp4` under the job's output prefix. Async invoke
/// reports completion slightly before the object lands, so absence is not an
/// error.
pub async fn find_video_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
) -> Result<Option<String>> {
    let response = client
        .list_objects_v2()
        .bucket(bucket)
        .prefix(prefix)
        .send()
        .await?;

    let key = response
        .contents()
        .iter()
        .filter_map(|object| object.key())
        .find(|key| key.ends_with(".mp4"))
        .map(str::to_owned);
    Ok(key)
}
