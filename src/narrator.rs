//! Decorative text for broadcast messages.
//!
//! Narration is never authoritative. A slow or failing generator falls back
//! to a canned line so the event still goes out.

use std::{fmt, time::Duration};

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy)]
pub enum Prompt<'a> {
    FellAsleep { username: &'a str, at: OffsetDateTime },
    Woke { username: &'a str, at: OffsetDateTime },
    Snoozed { username: &'a str, at: OffsetDateTime },
}

impl Prompt<'_> {
    fn username(&self) -> &str {
        match self {
            Prompt::FellAsleep { username, .. } | Prompt::Woke { username, .. } | Prompt::Snoozed { username, .. } => {
                username
            }
        }
    }
}

impl fmt::Display for Prompt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Prompt::FellAsleep { username, at } => write!(f, "{username} went to sleep at {at}"),
            Prompt::Woke { username, at } => write!(f, "{username} woke up at {at}"),
            Prompt::Snoozed { username, at } => {
                write!(f, "{username} let down their team by hitting snooze at {at}")
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    num_return_sequences: u32,
}

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

#[derive(Clone)]
struct Remote {
    http_client: reqwest::Client,
    url: String,
}

impl Remote {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let generated: Vec<Generated> = self
            .http_client
            .post(&self.url)
            .json(&GenerateRequest {
                inputs: prompt,
                parameters: GenerateParameters {
                    max_new_tokens: 25,
                    num_return_sequences: 1,
                },
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        generated
            .into_iter()
            .map(|g| g.generated_text.trim().to_owned())
            .find(|text| !text.is_empty())
            .ok_or_else(|| anyhow::anyhow!("generator returned no text"))
    }
}

#[derive(Clone)]
pub struct Narrator {
    remote: Option<Remote>,
    timeout: Duration,
}

impl Narrator {
    pub fn canned() -> Self {
        Narrator {
            remote: None,
            timeout: Duration::ZERO,
        }
    }

    /// Asks a text-generation endpoint first, giving it at most `timeout`.
    pub fn remote(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Narrator {
            remote: Some(Remote { http_client, url }),
            timeout,
        })
    }

    pub async fn narrate(&self, prompt: Prompt<'_>) -> String {
        if let Some(remote) = &self.remote {
            let text = prompt.to_string();
            match tokio::time::timeout(self.timeout, remote.generate(&text)).await {
                Ok(Ok(generated)) => return generated,
                Ok(Err(err)) => tracing::warn!(%err, "narrator failed, using a canned line"),
                Err(_) => tracing::warn!(timeout = ?self.timeout, "narrator timed out, using a canned line"),
            }
        }
        canned(prompt)
    }
}

fn canned(prompt: Prompt<'_>) -> String {
    let lines: &[&str] = match prompt {
        Prompt::FellAsleep { .. } => &[
            "{} has drifted off. Sweet dreams!",
            "{} is out like a light.",
            "{} tucked in right on schedule.",
            "Lights out for {}.",
        ],
        Prompt::Woke { .. } => &[
            "{} is up and at 'em!",
            "Rise and shine, {}.",
            "{} has rejoined the waking world.",
            "{} greets the day.",
        ],
        Prompt::Snoozed { .. } => &[
            "{} hit snooze. The team is watching.",
            "{} wants five more minutes.",
            "{} let the alarm down gently. Again.",
            "Snooze button pressed by {}.",
        ],
    };

    let line = lines.choose(&mut rand::rng()).copied().unwrap_or("{}");
    line.replace("{}", prompt.username())
}
