//! End-of-day delay history export to object storage.

use crate::model::DelayHistoryRow;
use anyhow::Result;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::info;

/// Uploads one operational day's delay rows as a JSON object, optionally
/// gzip-compressed, under `delay/date=<op_date>.json[.gz]`.
pub struct DelayExporter {
    client: aws_sdk_s3::Client,
    bucket: String,
    gzip: bool,
}

impl DelayExporter {
    pub async fn new(bucket: impl Into<String>, gzip: bool) -> Self {
        let config = aws_config::load_from_env().await;
        let client = aws_sdk_s3::Client::new(&config);
        Self {
            client,
            bucket: bucket.into(),
            gzip,
        }
    }

    pub async fn export_day(&self, op_date: NaiveDate, rows: &[DelayHistoryRow]) -> Result<()> {
        let body = serde_json::to_vec(rows)?;
        let (body, key, content_type) = if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            (
                encoder.finish()?,
                format!("delay/date={op_date}.json.gz"),
                "application/gzip",
            )
        } else {
            (body, format!("delay/date={op_date}.json"), "application/json")
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await?;

        info!(key, rows = rows.len(), "Delay history uploaded");
        Ok(())
    }
}
