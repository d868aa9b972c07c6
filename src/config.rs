use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feeds::{feedly, inoreader};
use crate::notify::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use crate::store::DocumentStore;

/// Where a run's configuration came from. The two sources are never merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigSource {
    Environment,
    Document { user_id: String },
}

#[derive(Clone, Debug)]
pub struct FeedlyConfig {
    pub access_token: String,
    pub folders: Vec<String>,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct InoreaderConfig {
    pub app_id: String,
    pub app_key: String,
    pub client_email: String,
    pub client_password: String,
    pub folders: Vec<String>,
    pub api_url: String,
    pub login_url: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub username: String,
    pub password: String,
    pub recipient: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Immutable per-run settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub source: ConfigSource,
    pub feedly: Option<FeedlyConfig>,
    pub inoreader: Option<InoreaderConfig>,
    pub openai_api_key: Option<String>,
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup. A section is present only when all
    /// of its required keys are.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let feedly = match (get("FEEDLY_ACCESS_TOKEN"), get("FEEDLY_FOLDERS")) {
            (Some(access_token), Some(folders)) => Some(FeedlyConfig {
                access_token,
                folders: split_folders(&folders, ","),
                api_url: get("FEEDLY_API_URL").unwrap_or_else(|| feedly::DEFAULT_API_URL.to_string()),
            }),
            _ => None,
        };

        let inoreader = match (
            get("INOREADER_APP_ID"),
            get("INOREADER_APP_KEY"),
            get("INOREADER_CLIENT_EMAIL"),
            get("INOREADER_CLIENT_PWD"),
            get("INOREADER_FOLDERS"),
        ) {
            (Some(app_id), Some(app_key), Some(client_email), Some(client_password), Some(folders)) => {
                Some(InoreaderConfig {
                    app_id,
                    app_key,
                    client_email,
                    client_password,
                    folders: split_folders(&folders, ","),
                    api_url: get("INOREADER_API_URL").unwrap_or_else(|| inoreader::DEFAULT_API_URL.to_string()),
                    login_url: get("INOREADER_LOGIN_URL").unwrap_or_else(|| inoreader::DEFAULT_LOGIN_URL.to_string()),
                })
            }
            _ => None,
        };

        let email = match (get("EMAIL_USERNAME"), get("EMAIL_PASSWORD"), get("EMAIL_RECIPIENT")) {
            (Some(username), Some(password), Some(recipient)) => Some(EmailConfig {
                username,
                password,
                recipient,
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: match get("SMTP_PORT") {
                    Some(p) => p.parse().with_context(|| format!("invalid SMTP_PORT: {p}"))?,
                    None => DEFAULT_SMTP_PORT,
                },
            }),
            _ => None,
        };

        Ok(AppConfig {
            source: ConfigSource::Environment,
            feedly,
            inoreader,
            openai_api_key: get("OPENAI_API_KEY"),
            email,
        })
    }

    /// Parse a per-user document. Every section must be present and complete.
    pub fn from_document(user_id: &str, doc: Value) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_value(doc)
            .with_context(|| format!("config document for user {user_id} is incomplete"))?;
        Ok(AppConfig {
            source: ConfigSource::Document { user_id: user_id.to_string() },
            feedly: Some(FeedlyConfig {
                access_token: doc.feedly.access_token,
                folders: split_folders(&doc.feedly.folders, ", "),
                api_url: doc.feedly.api_url.unwrap_or_else(|| feedly::DEFAULT_API_URL.to_string()),
            }),
            inoreader: Some(InoreaderConfig {
                app_id: doc.inoreader.app_id.into_string(),
                app_key: doc.inoreader.app_key.into_string(),
                client_email: doc.inoreader.client_email,
                client_password: doc.inoreader.client_password,
                folders: split_folders(&doc.inoreader.folders, ", "),
                api_url: doc.inoreader.api_url.unwrap_or_else(|| inoreader::DEFAULT_API_URL.to_string()),
                login_url: doc.inoreader.login_url.unwrap_or_else(|| inoreader::DEFAULT_LOGIN_URL.to_string()),
            }),
            openai_api_key: Some(doc.openai.api_key),
            email: Some(EmailConfig {
                username: doc.google.email_username,
                password: doc.google.email_password,
                recipient: doc.google.email_recipient,
                smtp_host: doc.google.smtp_host.unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: doc.google.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
            }),
        })
    }

    pub fn require_feedly(&self) -> Result<&FeedlyConfig> {
        match &self.feedly {
            Some(f) => Ok(f),
            None => bail!("Feedly is not configured (need FEEDLY_ACCESS_TOKEN and FEEDLY_FOLDERS)"),
        }
    }

    pub fn require_inoreader(&self) -> Result<&InoreaderConfig> {
        match &self.inoreader {
            Some(i) => Ok(i),
            None => bail!("Inoreader is not configured (need INOREADER_APP_ID, INOREADER_APP_KEY, INOREADER_CLIENT_EMAIL, INOREADER_CLIENT_PWD and INOREADER_FOLDERS)"),
        }
    }

    pub fn require_email(&self) -> Result<&EmailConfig> {
        match &self.email {
            Some(e) => Ok(e),
            None => bail!("email is not configured (need EMAIL_USERNAME, EMAIL_PASSWORD and EMAIL_RECIPIENT)"),
        }
    }
}

/// Resolve the configuration for a run.
/// `None` user reads the environment; `Some(user)` reads that user's document
/// and yields `Ok(None)` when no document exists.
pub async fn load(user_id: Option<&str>, store: Option<&dyn DocumentStore>) -> Result<Option<AppConfig>> {
    match user_id {
        None => {
            tracing::info!("Loading configuration from environment");
            AppConfig::from_env().map(Some)
        }
        Some(user) => {
            tracing::info!("Get config for user {user}");
            let Some(store) = store else { bail!("a document store is required to load config for user {user}") };
            match store.find_config_for_user(user).await? {
                Some(doc) => AppConfig::from_document(user, doc).map(Some),
                None => Ok(None),
            }
        }
    }
}

fn split_folders(raw: &str, sep: &str) -> Vec<String> {
    raw.split(sep).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    feedly: FeedlyDoc,
    inoreader: InoreaderDoc,
    openai: OpenAiDoc,
    google: GoogleDoc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedlyDoc {
    access_token: String,
    folders: String,
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InoreaderDoc {
    app_id: Scalar,
    app_key: Scalar,
    client_email: String,
    client_password: String,
    folders: String,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    login_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAiDoc {
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleDoc {
    email_username: String,
    email_password: String,
    email_recipient: String,
    #[serde(default)]
    smtp_host: Option<String>,
    #[serde(default)]
    smtp_port: Option<u16>,
}

// Inoreader app ids are numeric in some documents and strings in others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::collections::HashMap;

    pub(crate) fn sample_document() -> Value {
        json!({
            "feedly": {"user": "u1", "accessToken": "f-tok", "folders": "user/u1/category/ai, user/u1/category/ml"},
            "inoreader": {"appId": 1000001, "appKey": "k", "accessToken": "i-tok",
                          "clientEmail": "me@example.com", "clientPassword": "pw",
                          "folders": "user/-/label/uk-tech"},
            "openai": {"apiKey": "sk-test"},
            "google": {"emailUsername": "bot@example.com", "emailPassword": "app-pw",
                       "emailRecipient": "me@example.com"}
        })
    }

    #[test]
    fn env_sections_require_all_keys() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FEEDLY_ACCESS_TOKEN", "tok"),
            ("FEEDLY_FOLDERS", "a, b,,c"),
            ("INOREADER_APP_ID", "id"),
            ("OPENAI_API_KEY", "sk"),
        ]);
        let cfg = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.source, ConfigSource::Environment);
        let feedly = cfg.feedly.as_ref().unwrap();
        assert_eq!(feedly.folders, vec!["a", "b", "c"]);
        assert_eq!(feedly.api_url, feedly::DEFAULT_API_URL);
        assert!(cfg.inoreader.is_none());
        assert!(cfg.email.is_none());
        assert_eq!(cfg.openai_api_key.as_deref(), Some("sk"));
    }

    #[test]
    fn invalid_smtp_port_is_an_error() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EMAIL_USERNAME", "a"),
            ("EMAIL_PASSWORD", "b"),
            ("EMAIL_RECIPIENT", "c"),
            ("SMTP_PORT", "not-a-port"),
        ]);
        assert!(AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn document_splits_folders_and_stringifies_ids() {
        let cfg = AppConfig::from_document("u1", sample_document()).unwrap();
        assert_eq!(cfg.source, ConfigSource::Document { user_id: "u1".into() });
        assert_eq!(cfg.feedly.unwrap().folders, vec!["user/u1/category/ai", "user/u1/category/ml"]);
        let ino = cfg.inoreader.unwrap();
        assert_eq!(ino.app_id, "1000001");
        assert_eq!(ino.login_url, inoreader::DEFAULT_LOGIN_URL);
        assert_eq!(cfg.email.unwrap().smtp_port, DEFAULT_SMTP_PORT);
    }

    #[test]
    fn document_needs_no_stored_inoreader_token() {
        let mut doc = sample_document();
        doc["inoreader"].as_object_mut().unwrap().remove("accessToken");
        doc["feedly"].as_object_mut().unwrap().remove("user");
        let cfg = AppConfig::from_document("u1", doc).unwrap();
        assert_eq!(cfg.feedly.unwrap().access_token, "f-tok");
        assert_eq!(cfg.inoreader.unwrap().client_email, "me@example.com");
    }

    #[test]
    fn incomplete_document_is_rejected_whole() {
        let mut doc = sample_document();
        doc["openai"] = json!({});
        assert!(AppConfig::from_document("u1", doc).is_err());
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = MemoryStore::new();
        let out = load(Some("nobody"), Some(&store)).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn stored_document_is_loaded() {
        let store = MemoryStore::new();
        store.put_config("u1", sample_document()).await;
        let cfg = load(Some("u1"), Some(&store)).await.unwrap().unwrap();
        assert!(cfg.feedly.is_some());
        assert!(cfg.inoreader.is_some());
    }
}
