use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::astro::date_to_mjd;
use crate::config::AtlasConfig;
use crate::error::{MetabrokerError, Result};
use crate::types::Coordinates;

const QUEUE_RETRY_LIMIT: usize = 5;
const JOB_WAIT_LIMIT: Duration = Duration::from_secs(300);
const DEFAULT_LOOKBACK_DAYS: i64 = 3 * 365;

static THROTTLE_WAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"available in (\d+) (second|minute)").unwrap());

/// Username and password for the forced photometry service.
#[derive(Debug, Clone)]
pub struct AtlasCredentials {
    pub username: String,
    pub password: String,
}

/// One forced photometry measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotometryPoint {
    pub mjd: f64,
    pub mag: f64,
    pub e_mag: f64,
    /// ATLAS filter, "o" (orange) or "c" (cyan).
    pub filter: String,
    pub flux_ujy: f64,
    pub flux_err_ujy: f64,
    pub ra: f64,
    pub dec: f64,
}

/// The position and window a photometry run was requested for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParameters {
    pub ra: f64,
    pub dec: f64,
    pub mjd_min: f64,
}

/// Photometry rows plus the parameters they answer, as cached on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotometryResult {
    pub data: Vec<PhotometryPoint>,
    pub cached_at: DateTime<Utc>,
    pub parameters: QueryParameters,
}

/// Client for the ATLAS forced photometry service. Every request runs a
/// server-side job (queue, poll, download), so finished results are cached
/// on disk and reused for a few days.
pub struct AtlasClient {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    cache_days: u64,
}

impl AtlasClient {
    pub fn new(config: &AtlasConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            base_url: config.base_url.clone(),
            cache_dir: PathBuf::from(&config.cache_dir),
            cache_days: config.cache_days,
        })
    }

    /// Forced photometry for one position. `mjd_min` defaults to a window
    /// starting three years back.
    pub async fn photometry(
        &self,
        credentials: &AtlasCredentials,
        coordinates: Coordinates,
        mjd_min: Option<f64>,
    ) -> Result<PhotometryResult> {
        let mjd_min = mjd_min.unwrap_or_else(default_mjd_min);
        let cache_file = self.cache_path(coordinates, mjd_min);
        if let Some(cached) = self.load_cached(&cache_file).await {
            info!(
                ra = coordinates.ra,
                dec = coordinates.dec,
                "serving ATLAS photometry from cache"
            );
            return Ok(cached);
        }

        info!(
            ra = coordinates.ra,
            dec = coordinates.dec,
            mjd_min,
            "requesting ATLAS forced photometry"
        );
        let token = self.authenticate(credentials).await?;
        let task_url = self.queue_job(&token, coordinates, mjd_min).await?;
        let result_url = self.wait_for_job(&token, &task_url).await?;
        let table = self.download_results(&token, &result_url).await?;
        let data = parse_photometry_table(&table)?;

        let result = PhotometryResult {
            data,
            cached_at: Utc::now(),
            parameters: QueryParameters {
                ra: coordinates.ra,
                dec: coordinates.dec,
                mjd_min,
            },
        };
        self.store_cached(&cache_file, &result).await;
        Ok(result)
    }

    async fn authenticate(&self, credentials: &AtlasCredentials) -> Result<String> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(MetabrokerError::Config(
                "ATLAS credentials not provided".to_string(),
            ));
        }
        let response = self
            .client
            .post(format!("{}/api-token-auth/", self.base_url))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = match auth_failure_detail(&text) {
                Some(detail) => format!("ATLAS authentication failed: {detail}"),
                None => format!("ATLAS authentication failed: HTTP {status}"),
            };
            return Err(MetabrokerError::UpstreamUnavailable(message));
        }
        let body: Value = response.json().await?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                MetabrokerError::UpstreamUnavailable(
                    "ATLAS token response had no token field".to_string(),
                )
            })
    }

    /// Queue a photometry job. A 429 carries the wait time in its detail
    /// message, so the client sleeps it out and tries again.
    async fn queue_job(
        &self,
        token: &str,
        coordinates: Coordinates,
        mjd_min: f64,
    ) -> Result<String> {
        for attempt in 0..QUEUE_RETRY_LIMIT {
            let response = self
                .client
                .post(format!("{}/queue/", self.base_url))
                .header(AUTHORIZATION, format!("Token {token}"))
                .header(ACCEPT, "application/json")
                .form(&[
                    ("ra", coordinates.ra.to_string()),
                    ("dec", coordinates.dec.to_string()),
                    ("mjd_min", mjd_min.to_string()),
                ])
                .send()
                .await?;
            match response.status() {
                StatusCode::CREATED => {
                    let body: Value = response.json().await?;
                    return body
                        .get("url")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            MetabrokerError::UpstreamUnavailable(
                                "ATLAS queue response had no task url".to_string(),
                            )
                        });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    let detail = body
                        .get("detail")
                        .and_then(Value::as_str)
                        .unwrap_or("rate limited");
                    let wait = throttle_wait(detail);
                    warn!(
                        attempt,
                        wait_seconds = wait.as_secs(),
                        detail,
                        "ATLAS queue throttled"
                    );
                    sleep(wait).await;
                }
                status => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(MetabrokerError::UpstreamUnavailable(format!(
                        "ATLAS queue request failed: HTTP {status} {text}"
                    )));
                }
            }
        }
        Err(MetabrokerError::UpstreamUnavailable(
            "ATLAS queue retries exhausted".to_string(),
        ))
    }

    /// Poll the task until the server stamps it finished, backing off more
    /// while the job is still queued than while it runs.
    async fn wait_for_job(&self, token: &str, task_url: &str) -> Result<String> {
        let started = Instant::now();
        let mut start_logged = false;
        loop {
            if started.elapsed() > JOB_WAIT_LIMIT {
                return Err(MetabrokerError::UpstreamUnavailable(format!(
                    "ATLAS job timed out after {} seconds",
                    JOB_WAIT_LIMIT.as_secs()
                )));
            }
            let response = self
                .client
                .get(task_url)
                .header(AUTHORIZATION, format!("Token {token}"))
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                return Err(MetabrokerError::UpstreamUnavailable(format!(
                    "ATLAS status check failed: HTTP {status}"
                )));
            }
            let job: Value = response.json().await?;
            if timestamp_set(&job, "finishtimestamp") {
                return job
                    .get("result_url")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        MetabrokerError::UpstreamUnavailable(
                            "ATLAS job finished without a result url".to_string(),
                        )
                    });
            }
            if timestamp_set(&job, "starttimestamp") {
                if !start_logged {
                    debug!(task_url, "ATLAS job started");
                    start_logged = true;
                }
                sleep(Duration::from_secs(2)).await;
            } else {
                debug!(task_url, "ATLAS job still queued");
                sleep(Duration::from_secs(4)).await;
            }
        }
    }

    async fn download_results(&self, token: &str, result_url: &str) -> Result<String> {
        let response = self
            .client
            .get(result_url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(MetabrokerError::UpstreamUnavailable(format!(
                "ATLAS download failed: HTTP {status}"
            )));
        }
        Ok(response.text().await?)
    }

    fn cache_path(&self, coordinates: Coordinates, mjd_min: f64) -> PathBuf {
        let key = format!(
            "{:.6}_{:.6}_{:.1}",
            coordinates.ra, coordinates.dec, mjd_min
        );
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.cache_dir.join(format!("atlas_{digest}.json"))
    }

    async fn load_cached(&self, path: &Path) -> Option<PhotometryResult> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age > Duration::from_secs(self.cache_days * 24 * 60 * 60) {
            return None;
        }
        let bytes = tokio::fs::read(path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable ATLAS cache file");
                None
            }
        }
    }

    /// A cache write failure costs a repeat job later, not the response.
    async fn store_cached(&self, path: &Path, result: &PhotometryResult) {
        if let Err(e) = self.try_store(path, result).await {
            warn!(path = %path.display(), error = %e, "failed to write ATLAS cache file");
        }
    }

    async fn try_store(&self, path: &Path, result: &PhotometryResult) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let body = serde_json::to_vec(result)?;
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

/// Default photometry window start, three years back from today.
fn default_mjd_min() -> f64 {
    let start = Utc::now().date_naive() - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS);
    date_to_mjd(start) as f64
}

fn auth_failure_detail(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("non_field_errors")?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

fn throttle_wait(detail: &str) -> Duration {
    if let Some(caps) = THROTTLE_WAIT_RE.captures(detail) {
        if let Ok(amount) = caps[1].parse::<u64>() {
            let seconds = match &caps[2] {
                "minute" => amount * 60,
                _ => amount,
            };
            return Duration::from_secs(seconds);
        }
    }
    Duration::from_secs(10)
}

fn timestamp_set(job: &Value, key: &str) -> bool {
    match job.get(key) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

/// Parse the whitespace-separated result table. The header names columns
/// (the first is spelled `###MJD`); rows missing a parseable magnitude or
/// error are upper limits and get skipped.
fn parse_photometry_table(table: &str) -> Result<Vec<PhotometryPoint>> {
    let mut lines = table.lines().filter(|line| !line.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| MetabrokerError::ParseError("ATLAS result table was empty".to_string()))?;
    let columns: Vec<String> = header
        .split_whitespace()
        .map(|c| c.trim_start_matches('#').to_string())
        .collect();
    let col = |name: &str| columns.iter().position(|c| c == name);
    let required = |name: &str| {
        col(name).ok_or_else(|| {
            MetabrokerError::ParseError(format!("ATLAS result table had no {name} column"))
        })
    };
    let mjd_col = required("MJD")?;
    let mag_col = required("m")?;
    let err_col = required("dm")?;
    let filter_col = required("F")?;
    let flux_col = col("uJy");
    let flux_err_col = col("duJy");
    let ra_col = col("RA");
    let dec_col = col("Dec");

    let mut points = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(mjd), Some(mag), Some(e_mag)) = (
            parse_field(&fields, Some(mjd_col)),
            parse_field(&fields, Some(mag_col)),
            parse_field(&fields, Some(err_col)),
        ) else {
            continue;
        };
        points.push(PhotometryPoint {
            mjd,
            mag,
            e_mag,
            filter: fields.get(filter_col).copied().unwrap_or("").to_string(),
            flux_ujy: parse_field(&fields, flux_col).unwrap_or(0.0),
            flux_err_ujy: parse_field(&fields, flux_err_col).unwrap_or(0.0),
            ra: parse_field(&fields, ra_col).unwrap_or(0.0),
            dec: parse_field(&fields, dec_col).unwrap_or(0.0),
        });
    }
    Ok(points)
}

fn parse_field(fields: &[&str], index: Option<usize>) -> Option<f64> {
    index
        .and_then(|i| fields.get(i))
        .and_then(|f| f.parse().ok())
}
