//! Scriptable collaborators and fixtures for engine tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosme_core::{ManualClock, Product, RunTarget, ScrapedProduct};

use crate::collaborators::{
    CollaboratorError, MediaArtifact, Notifier, Renderer, Scraper, Summarizer, Uploader,
};
use crate::orchestrator::RunNotice;

pub fn fixed_clock() -> Arc<ManualClock> {
    let start = DateTime::parse_from_rfc3339("2026-10-19T09:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc);
    Arc::new(ManualClock::new(start))
}

pub fn product(id: &str, rank: i32, last_used: Option<DateTime<Utc>>) -> Product {
    Product {
        product_id: id.to_string(),
        genre: "skincare".to_string(),
        channel: "drugstore".to_string(),
        name: format!("Lotion {id}"),
        brand: "Hada Labo".to_string(),
        image_url: format!("https://img.example/{id}.jpg"),
        product_url: None,
        brand_url: None,
        scraped_rank: rank,
        first_seen: DateTime::UNIX_EPOCH,
        last_used,
    }
}

pub fn scraped(id: &str, rank: i32) -> ScrapedProduct {
    ScrapedProduct {
        product_id: id.to_string(),
        genre: String::new(),
        channel: String::new(),
        name: format!("Lotion {id}"),
        brand: "Hada Labo".to_string(),
        image_url: format!("https://img.example/{id}.jpg"),
        product_url: None,
        brand_url: None,
        rank,
    }
}

#[derive(Default)]
pub struct FakeScraper {
    pub items: Vec<ScrapedProduct>,
    pub fail: bool,
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn fetch_ranking(
        &self,
        _target: &RunTarget,
    ) -> Result<Vec<ScrapedProduct>, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Request("ranking page timed out".to_string()));
        }
        Ok(self.items.clone())
    }
}

/// Returns `texts` (or fails) and counts invocations.
#[derive(Default)]
pub struct FakeSummarizer {
    pub texts: Vec<String>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeSummarizer {
    pub fn returning(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _product: &Product) -> Result<Vec<String>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Request("model overloaded".to_string()));
        }
        Ok(self.texts.clone())
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub fail: AtomicBool,
    pub rendered: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        product: &Product,
        summaries: &[String],
    ) -> Result<MediaArtifact, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::InvalidResponse(
                "renderer exited with status 1".to_string(),
            ));
        }
        if let Ok(mut rendered) = self.rendered.lock() {
            rendered.push((product.product_id.clone(), summaries.to_vec()));
        }
        Ok(MediaArtifact {
            path: PathBuf::from(format!("/tmp/{}.mp4", product.product_id)),
        })
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail: AtomicBool,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, artifact: &MediaArtifact) -> Result<String, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Request("bucket unavailable".to_string()));
        }
        let name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("gs://test-bucket/videos/{name}"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    pub notices: Mutex<Vec<RunNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<RunNotice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &RunNotice) -> Result<(), CollaboratorError> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
        if self.fail {
            return Err(CollaboratorError::Request("webhook returned 500".to_string()));
        }
        Ok(())
    }
}
