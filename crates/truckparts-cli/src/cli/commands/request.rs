//! Raw API request handler.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use truckparts_core::config::Config;
use truckparts_core::error::ApiResult;
use truckparts_core::gateway::{Gateway, RequestOptions};

use super::{parse_pairs, print_json, session_controller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    fn parse(method: &str) -> Result<Self> {
        Ok(match method.to_ascii_uppercase().as_str() {
            "GET" => Verb::Get,
            "POST" => Verb::Post,
            "PUT" => Verb::Put,
            "PATCH" => Verb::Patch,
            "DELETE" => Verb::Delete,
            other => bail!("Unsupported method: {other}"),
        })
    }
}

pub async fn run(
    config: &Config,
    method: &str,
    path: &str,
    data: Option<&str>,
    query: &[String],
    no_auth: bool,
) -> Result<()> {
    let verb = Verb::parse(method)?;
    let body: Value = match data {
        Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON")?,
        None => Value::Object(serde_json::Map::new()),
    };
    let query = parse_pairs(query)?;
    if !query.is_empty() && verb != Verb::Get {
        bail!("--query is only supported for GET");
    }
    let opts = RequestOptions {
        skip_auth: no_auth,
        ..RequestOptions::default()
    };

    let controller = session_controller(config, "/")?;
    let gateway = controller.gateway();

    let mut result = send(gateway, verb, path, &body, &query, opts).await;
    if let Err(e) = &result
        && e.retryable
    {
        tracing::debug!("retrying after token refresh");
        result = send(gateway, verb, path, &body, &query, opts).await;
    }

    print_json(&result?)
}

async fn send(
    gateway: &Gateway,
    verb: Verb,
    path: &str,
    body: &Value,
    query: &[(String, String)],
    opts: RequestOptions,
) -> ApiResult<Value> {
    match verb {
        Verb::Get if query.is_empty() => gateway.get(path, opts).await,
        Verb::Get => {
            let pairs: Vec<(&str, &str)> = query
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            gateway.get_query(path, &pairs, opts).await
        }
        Verb::Post => gateway.post(path, body, opts).await,
        Verb::Put => gateway.put(path, body, opts).await,
        Verb::Patch => gateway.patch(path, body, opts).await,
        Verb::Delete => gateway.delete(path, opts).await,
    }
}
