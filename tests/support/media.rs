//! Wiremock responders that behave like a media origin.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use wiremock::{Request, Respond, ResponseTemplate};

/// Deterministic, non-repeating-looking payload of `len` bytes.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 251) % 256) as u8).collect()
}

/// Serves one file, honoring `Range` requests when enabled.
///
/// HEAD requests report `Content-Length` (and `Accept-Ranges: bytes` when
/// ranges are on). Ranged GETs whose start offset is listed in `fail_at`
/// answer 500.
#[derive(Clone)]
pub struct RangedFile {
    body: Arc<Vec<u8>>,
    accept_ranges: bool,
    fail_at: Vec<u64>,
    content_type: &'static str,
    ranges_seen: Arc<Mutex<Vec<String>>>,
}

impl RangedFile {
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            accept_ranges: true,
            fail_at: Vec::new(),
            content_type: "video/mp4",
            ranges_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    #[must_use]
    pub fn failing_range_at(mut self, start: u64) -> Self {
        self.fail_at.push(start);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    /// Every `Range` header value received on GET requests, in arrival order.
    #[must_use]
    pub fn ranges_seen(&self) -> Vec<String> {
        self.ranges_seen.lock().unwrap().clone()
    }

    fn requested_range(request: &Request) -> Option<(u64, Option<u64>)> {
        let raw = request.headers.get("range")?.to_str().ok()?;
        let spec = raw.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        let start = start.parse().ok()?;
        let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
        Some((start, end))
    }
}

impl Respond for RangedFile {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.body.len() as u64;
        let mut template = ResponseTemplate::new(200).insert_header("content-type", self.content_type);
        if self.accept_ranges {
            template = template.insert_header("accept-ranges", "bytes");
        }

        if request.method.as_str() == "HEAD" {
            return template.set_body_bytes(self.body.to_vec());
        }

        if let Some(raw) = request.headers.get("range").and_then(|v| v.to_str().ok()) {
            self.ranges_seen.lock().unwrap().push(raw.to_string());
        }

        match Self::requested_range(request) {
            Some((start, end)) if self.accept_ranges && start < len => {
                if self.fail_at.contains(&start) {
                    return ResponseTemplate::new(500).set_body_bytes(b"range failed".to_vec());
                }
                let end = end.unwrap_or(len - 1).min(len - 1);
                let slice = self.body[start as usize..=end as usize].to_vec();
                ResponseTemplate::new(206)
                    .insert_header("content-type", self.content_type)
                    .insert_header("content-range", format!("bytes {start}-{end}/{len}").as_str())
                    .set_body_bytes(slice)
            }
            _ => template.set_body_bytes(self.body.to_vec()),
        }
    }
}
