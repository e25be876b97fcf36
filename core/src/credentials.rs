//! Discovery and collection of the secrets a boot script needs.
//!
//! Discovery is a textual scan of the unrendered boot script for two shapes:
//!
//! ```text
//! core:{{ core_password }}              list style (chpasswd)
//!
//! - name: suser                         account-block style
//!   passwd: "{{ suser_pw | hash_password }}"
//! ```
//!
//! Collection is delegated to a [`SecretCollector`] so that the terminal is
//! kept out of this crate.

use crate::config::document::{Auth, InputDecl};
use crate::config::resolver::{ResolutionError, ResolvedSpec};
use itertools::Itertools;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const MAX_ATTEMPTS: u32 = 5;

/// Template variables that are filled in by the tool, never by the operator.
pub const RESERVED_KEYS: [&str; 4] = ["username", "interface_name", "static_ip", "gateway_ip"];

/// Account-block keys that look like a list entry when written without a
/// space after the colon.
const BLOCK_KEYWORDS: [&str; 2] = ["passwd", "password"];

#[allow(clippy::expect_used)]
static LIST_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:-\s*)?([^:\s-][^:\s]*):\{\{\s*(\w+)\s*(?:\|[^}]*)?\}\}")
        .expect("Failed to compile regex")
});

#[allow(clippy::expect_used)]
static BLOCK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-\s*name:").expect("Failed to compile regex"));

#[allow(clippy::expect_used)]
static BLOCK_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\w\-]+)").expect("Failed to compile regex"));

#[allow(clippy::expect_used)]
static BLOCK_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*pass(?:wd|word):\s*['"]?\{\{\s*(\w+)\s*(?:\|[^}]*)?\}\}['"]?"#)
        .expect("Failed to compile regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequest {
    pub key: String,
    pub prompt: String,
    pub account: Option<String>,
}

impl SecretRequest {
    fn for_account(key: &str, account: &str) -> Self {
        Self {
            key: key.to_string(),
            prompt: format!("Enter password for user '{account}'"),
            account: Some(account.to_string()),
        }
    }
}

/// Single capability used to read one secret value from the operator.
#[cfg_attr(test, mockall::automock)]
pub trait SecretCollector {
    fn read_secret(&self, prompt: &str) -> std::io::Result<String>;
}

/// Scans an unrendered boot script for password variables, in the order
/// they first appear. Each key is reported once.
pub fn discover(boot_script: &str) -> Vec<SecretRequest> {
    let mut found: Vec<(usize, SecretRequest)> = Vec::new();

    for captures in LIST_STYLE.captures_iter(boot_script) {
        let (Some(account), Some(key)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        if BLOCK_KEYWORDS.contains(&account.as_str()) {
            continue;
        }
        found.push((
            key.start(),
            SecretRequest::for_account(key.as_str(), account.as_str()),
        ));
    }

    let starts: Vec<_> = BLOCK_START.find_iter(boot_script).collect();
    for (idx, start) in starts.iter().enumerate() {
        let end = starts
            .get(idx + 1)
            .map_or(boot_script.len(), |next| next.start());
        let block = &boot_script[start.end()..end];

        let Some(account) = BLOCK_ACCOUNT.captures(block).and_then(|c| c.get(1)) else {
            continue;
        };
        let Some(key) = BLOCK_PASSWORD.captures(block).and_then(|c| c.get(1)) else {
            continue;
        };
        found.push((
            start.end() + key.start(),
            SecretRequest::for_account(key.as_str(), account.as_str()),
        ));
    }

    found.sort_by_key(|(position, _)| *position);

    found
        .into_iter()
        .map(|(_, request)| request)
        .filter(|request| !RESERVED_KEYS.contains(&request.key.as_str()))
        .unique_by(|request| request.key.clone())
        .collect()
}

/// Declared inputs come first, keeping their own prompt when they have one.
/// Discovered requests not declared follow. With nothing to ask and an auth
/// record lacking a password, a single generic password request is made.
pub fn merge_inputs(
    declared: &[InputDecl],
    discovered: Vec<SecretRequest>,
    auth: &Auth,
) -> Vec<SecretRequest> {
    let mut merged: Vec<SecretRequest> = Vec::new();
    let mut seen = HashSet::new();

    for input in declared {
        if !seen.insert(input.key.clone()) {
            continue;
        }
        let found = discovered.iter().find(|d| d.key == input.key);
        let prompt = input
            .prompt
            .clone()
            .or_else(|| found.map(|d| d.prompt.clone()))
            .unwrap_or_else(|| format!("Enter value for '{}'", input.key));
        merged.push(SecretRequest {
            key: input.key.clone(),
            prompt,
            account: found.and_then(|d| d.account.clone()),
        });
    }

    for request in discovered {
        if seen.insert(request.key.clone()) {
            merged.push(request);
        }
    }

    if merged.is_empty() && !auth.has_password() {
        merged.push(SecretRequest {
            key: "password".to_string(),
            prompt: format!(
                "Password for {}",
                auth.username.as_deref().unwrap_or("user")
            ),
            account: auth.username.clone(),
        });
    }

    merged
}

/// The full list of requests for a resolved spec.
pub fn requests_for(spec: &ResolvedSpec) -> Vec<SecretRequest> {
    merge_inputs(spec.inputs(), discover(spec.boot_script()), spec.auth())
}

/// Satisfies every request whose field is still empty. A value is accepted
/// only when it is non-empty and confirmed by a second, identical entry.
pub fn collect_secrets(
    spec: &mut ResolvedSpec,
    requests: &[SecretRequest],
    collector: &dyn SecretCollector,
) -> Result<(), ResolutionError> {
    for request in requests {
        if spec.secret_value(&request.key).is_some() {
            debug!("Secret '{}' already set, not prompting", request.key);
            continue;
        }
        let value = collect_one(request, collector)?;
        spec.set_secret(&request.key, value);
    }
    Ok(())
}

fn collect_one(
    request: &SecretRequest,
    collector: &dyn SecretCollector,
) -> Result<String, ResolutionError> {
    let read = |prompt: &str| {
        collector
            .read_secret(prompt)
            .map_err(|err| ResolutionError::Collector {
                key: request.key.clone(),
                reason: err.to_string(),
            })
    };

    for _ in 0..MAX_ATTEMPTS {
        let value = read(&request.prompt)?;
        if value.is_empty() {
            warn!("Empty value for '{}' rejected", request.key);
            continue;
        }
        let confirmation = read(&format!("Confirm {}", request.prompt))?;
        if confirmation != value {
            warn!("Values for '{}' do not match", request.key);
            continue;
        }
        return Ok(value);
    }

    Err(ResolutionError::SecretNotCollected {
        key: request.key.clone(),
        attempts: MAX_ATTEMPTS,
    })
}
