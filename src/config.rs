use anyhow::{bail, Context};

use crate::api::Credentials;
use crate::models::Role;
use crate::threshold::{Thresholds, DEFAULT_SAFE_THRESHOLD, DEFAULT_WARNING_THRESHOLD};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/ws";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub socket_url: String,
    pub thresholds: Thresholds,
    pub credentials: Option<Credentials>,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_url = lookup("ATTENDANCE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let socket_url =
            lookup("ATTENDANCE_SOCKET_URL").unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string());

        let safe = parse_percentage(&lookup, "ATTENDANCE_SAFE_THRESHOLD", DEFAULT_SAFE_THRESHOLD)?;
        let warning = parse_percentage(
            &lookup,
            "ATTENDANCE_WARNING_THRESHOLD",
            DEFAULT_WARNING_THRESHOLD,
        )?;
        let thresholds = Thresholds::new(safe, warning)?;

        let credentials = match (lookup("ATTENDANCE_EMAIL"), lookup("ATTENDANCE_PASSWORD")) {
            (Some(email), Some(password)) => Some(Credentials {
                email,
                password,
                role: parse_role(lookup("ATTENDANCE_ROLE").as_deref())?,
            }),
            (None, None) => None,
            _ => bail!("ATTENDANCE_EMAIL and ATTENDANCE_PASSWORD must be set together"),
        };

        let log_json = match lookup("ATTENDANCE_LOG_JSON").as_deref() {
            None => false,
            Some("1" | "true" | "TRUE" | "yes" | "YES") => true,
            Some("0" | "false" | "FALSE" | "no" | "NO") => false,
            Some(other) => bail!("ATTENDANCE_LOG_JSON must be a boolean, got {other:?}"),
        };

        Ok(Self {
            api_url,
            socket_url,
            thresholds,
            credentials,
            log_json,
        })
    }
}

fn parse_percentage(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: f64,
) -> anyhow::Result<f64> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a number, got {raw:?}"))?;
    if !(0.0..=100.0).contains(&value) {
        bail!("{name} must be between 0 and 100, got {value}");
    }
    Ok(value)
}

fn parse_role(raw: Option<&str>) -> anyhow::Result<Role> {
    match raw.map(str::to_lowercase).as_deref() {
        None | Some("student") => Ok(Role::Student),
        Some("teacher") => Ok(Role::Teacher),
        Some("admin") => Ok(Role::Admin),
        Some(other) => bail!("ATTENDANCE_ROLE must be admin, teacher or student, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(config.thresholds, Thresholds::default());
        assert!(config.credentials.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn reads_thresholds_and_credentials() {
        let config = config(&[
            ("ATTENDANCE_SAFE_THRESHOLD", "80"),
            ("ATTENDANCE_WARNING_THRESHOLD", "70"),
            ("ATTENDANCE_EMAIL", "teacher@example.com"),
            ("ATTENDANCE_PASSWORD", "secret"),
            ("ATTENDANCE_ROLE", "Teacher"),
            ("ATTENDANCE_LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(config.thresholds.safe, 80.0);
        assert_eq!(config.thresholds.warning, 70.0);
        assert_eq!(config.credentials.unwrap().role, Role::Teacher);
        assert!(config.log_json);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config(&[("ATTENDANCE_SAFE_THRESHOLD", "high")]).is_err());
        assert!(config(&[("ATTENDANCE_SAFE_THRESHOLD", "120")]).is_err());
        assert!(config(&[("ATTENDANCE_WARNING_THRESHOLD", "90")]).is_err());
        assert!(config(&[("ATTENDANCE_EMAIL", "a@b.c")]).is_err());
        assert!(config(&[("ATTENDANCE_LOG_JSON", "maybe")]).is_err());
    }
}
