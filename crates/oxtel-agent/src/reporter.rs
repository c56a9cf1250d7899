use crate::config::AgentConfig;
use anyhow::{bail, Context, Result};
use oxtel_common::types::{Metric, MetricKind};
use oxtel_common::{crypto, gzip, sign};
use oxtel_storage::memory::MemStorage;
use reqwest::header;
use rsa::RsaPublicKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TRANSPORT_RETRIES: u32 = 3;
const RETRY_MIN_WAIT: Duration = Duration::from_secs(1);
const RETRY_MAX_WAIT: Duration = Duration::from_secs(5);

/// Builds and ships one report per report tick: snapshot, JSON-encode,
/// gzip, optionally RSA-encrypt the compressed bytes, optionally sign the
/// post-encryption body, POST to `/updates/`.
pub struct Reporter {
    store: Arc<MemStorage>,
    client: reqwest::Client,
    update_url: String,
    signing_key: Option<String>,
    public_key: Option<RsaPublicKey>,
}

impl Reporter {
    pub fn new(config: &AgentConfig, store: Arc<MemStorage>) -> Result<Self> {
        let public_key = match &config.crypto_key {
            Some(path) => Some(crypto::load_public_key(path)?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            store,
            client,
            update_url: format!("{}/updates/", config.http_endpoint()),
            signing_key: config.signing_key.clone(),
            public_key,
        })
    }

    /// Encodes a batch into the wire body: JSON array, gzipped, then
    /// encrypted when a public key is installed.
    fn encode(&self, metrics: &[Metric]) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(metrics).context("failed to encode report")?;
        let body = gzip::compress(&body).context("failed to compress report")?;
        match &self.public_key {
            Some(key) => crypto::encrypt(key, &body),
            None => Ok(body),
        }
    }

    pub async fn send_report(&self) -> Result<()> {
        let metrics = self.store.snapshot();
        if metrics.is_empty() {
            bail!("no metrics to send");
        }

        let body = self.encode(&metrics)?;
        let response = self.post_with_retry(&body).await?;
        if !response.status().is_success() {
            bail!("server rejected report: {}", response.status());
        }

        // Successful delivery restarts the poll-count accumulation.
        if let Err(err) = self
            .store
            .reset_metric(crate::poller::POLL_COUNT_METRIC, MetricKind::Counter)
        {
            tracing::error!(error = %err, "failed to reset poll count");
        }
        Ok(())
    }

    /// Transport-level retries only: a response from the server, whatever
    /// the status, ends the loop. Backoff doubles from 1s up to 5s.
    async fn post_with_retry(&self, body: &[u8]) -> Result<reqwest::Response> {
        let mut wait = RETRY_MIN_WAIT;
        let mut attempt = 0u32;
        loop {
            let mut request = self
                .client
                .post(&self.update_url)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_ENCODING, "gzip")
                .body(body.to_vec());
            if let Some(key) = &self.signing_key {
                request = request.header("HashSHA256", sign::sign(body, key));
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < TRANSPORT_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "report send failed, backing off");
                    sleep(wait).await;
                    wait = (wait * 2).min(RETRY_MAX_WAIT);
                }
                Err(err) => return Err(err).context("failed to send metrics"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn reporter(config: &AgentConfig) -> Reporter {
        Reporter::new(config, Arc::new(MemStorage::new())).unwrap()
    }

    #[test]
    fn encoded_report_survives_the_server_side_decoder() {
        let metrics = vec![Metric::gauge("Alloc", 1024.0), Metric::counter("PollCount", 3)];
        let body = reporter(&AgentConfig::default()).encode(&metrics).unwrap();

        let decoded: Vec<Metric> =
            serde_json::from_slice(&gzip::decompress(&body).unwrap()).unwrap();
        assert_eq!(decoded, metrics);
    }

    #[test]
    fn encrypted_report_decrypts_with_the_private_key() {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let mut reporter = reporter(&AgentConfig::default());
        reporter.public_key = Some(RsaPublicKey::from(&private_key));

        let metrics = vec![Metric::gauge("Alloc", 1024.0)];
        let body = reporter.encode(&metrics).unwrap();
        // an OAEP envelope is a whole number of key-size blocks
        assert_eq!(body.len() % 256, 0);

        let compressed = crypto::decrypt(&private_key, &body).unwrap();
        let decoded: Vec<Metric> =
            serde_json::from_slice(&gzip::decompress(&compressed).unwrap()).unwrap();
        assert_eq!(decoded, metrics);
    }

    #[test]
    fn signature_covers_the_post_encryption_body() {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let mut reporter = reporter(&AgentConfig::default());
        reporter.public_key = Some(RsaPublicKey::from(&private_key));
        reporter.signing_key = Some("secret".into());

        let body = reporter.encode(&[Metric::counter("PollCount", 1)]).unwrap();
        let signature = sign::sign(&body, "secret");
        assert!(sign::verify(&body, "secret", &signature));
    }
}
