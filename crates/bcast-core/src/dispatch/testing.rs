use std::{collections::HashSet, sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::RecipientId,
    errors::Error,
    transport::{port::Transport, types::MediaRef},
    Result,
};

/// In-memory transport for dispatcher tests.
#[derive(Default)]
pub(crate) struct FakeTransport {
    pub fail: HashSet<String>,
    pub panic_on: HashSet<String>,
    pub hang_on: HashSet<String>,
    attempts: Mutex<Vec<(String, &'static str)>>,
}

impl FakeTransport {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn attempted_ids(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn attempted_kinds(&self) -> Vec<&'static str> {
        self.attempts.lock().unwrap().iter().map(|(_, k)| *k).collect()
    }

    async fn record(&self, to: &RecipientId, kind: &'static str) -> Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((to.as_str().to_string(), kind));

        if self.panic_on.contains(to.as_str()) {
            panic!("transport blew up for {to}");
        }
        if self.hang_on.contains(to.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail.contains(to.as_str()) {
            return Err(Error::Delivery {
                recipient: to.to_string(),
                reason: "bot was blocked by the user".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&self, to: &RecipientId, _text: &str) -> Result<()> {
        self.record(to, "text").await
    }

    async fn send_photo(&self, to: &RecipientId, _media: &MediaRef, _caption: &str) -> Result<()> {
        self.record(to, "photo").await
    }
}

pub(crate) fn ids(range: std::ops::Range<usize>) -> Vec<RecipientId> {
    range.map(|i| RecipientId(i.to_string())).collect()
}
