use bytes::Bytes;
use reqwest::Client;

use super::types::FetchCause;

pub async fn fetch_feed(client: &Client, url: &str) -> Result<Bytes, FetchCause> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchCause::Status(status));
    }
    Ok(resp.bytes().await?)
}
