//! The reMarkable cloud implementation of [`Device`].
//!
//! Authentication is two-staged. A one-time code from `my.remarkable.com` is exchanged once for
//! a long-lived device token, which is kept in a token file. Every run then trades the device
//! token for a short-lived user token and looks up the storage host it should talk to.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collaborators::{DeleteOutcome, Device, PdfDocument};
use crate::error::DeviceError;

const FOLDER_TYPE: &str = "CollectionType";
const DOCUMENT_TYPE: &str = "DocumentType";

/// Base URLs of the services the client talks to.
#[derive(Clone, Debug)]
pub struct Endpoints {
    /// Issues device and user tokens.
    pub auth: String,
    /// Tells us which storage host serves this account.
    pub service_manager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            auth: String::from("https://webapp-prod.cloud.remarkable.engineering"),
            service_manager: String::from(
                "https://service-manager-production-dot-remarkable-production.appspot.com",
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemarkableSettings {
    /// Where the device token is kept between runs.
    pub token_file: PathBuf,
    /// Needed only until a device token has been stored.
    pub one_time_code: Option<String>,
    /// Bound on every HTTP call.
    pub timeout: Duration,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    device_id: String,
    device_token: String,
}

/// An authenticated connection to the storage host.
#[derive(Debug)]
struct Session {
    user_token: String,
    storage: String,
}

#[derive(Debug, Deserialize)]
struct ServiceHost {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Host", default)]
    host: String,
}

#[derive(Clone, Debug, Deserialize)]
struct Item {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Version", default)]
    version: u64,
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "VissibleName", default)]
    name: String,
    #[serde(rename = "Parent", default)]
    parent: String,
}

#[derive(Debug, Deserialize)]
struct ItemResult {
    #[serde(rename = "Success", default)]
    success: bool,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Uploaded {
    #[serde(rename = "docID")]
    doc_id: String,
}

/// A [`Device`] backed by the reMarkable cloud.
pub struct RemarkableClient {
    http: Client,
    settings: RemarkableSettings,
    session: Option<Session>,
    /// Folder name to folder id, for the lifetime of this client.
    folders: HashMap<String, String>,
}

impl RemarkableClient {
    pub fn new(settings: RemarkableSettings) -> Result<Self, DeviceError> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(RemarkableClient {
            http,
            settings,
            session: None,
            folders: HashMap::new(),
        })
    }

    /// Make sure a device token exists, registering with the one-time code if needed.
    pub fn register(&self) -> Result<(), DeviceError> {
        self.device_token().map(|_| ())
    }

    fn device_token(&self) -> Result<String, DeviceError> {
        let path = &self.settings.token_file;
        match fs::read_to_string(path) {
            Ok(contents) => {
                let stored: StoredToken = serde_json::from_str(&contents).map_err(|e| {
                    DeviceError::Token(format!("{} is not a token file: {}", path.display(), e))
                })?;
                return Ok(stored.device_token);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DeviceError::Token(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        let code = self
            .settings
            .one_time_code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| {
                DeviceError::Token(String::from(
                    "no device token stored and no one-time code configured",
                ))
            })?;

        let device_id = Uuid::new_v4().to_string();
        let endpoint = format!("{}/token/json/2/device/new", self.settings.endpoints.auth);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({
                "code": code.trim(),
                "deviceDesc": "desktop-linux",
                "deviceID": device_id,
            }))
            .send()?;
        let device_token = check(response, &endpoint)?.text()?.trim().to_string();
        if device_token.is_empty() {
            return Err(DeviceError::Malformed {
                endpoint,
                reason: String::from("empty device token"),
            });
        }

        let stored = StoredToken {
            device_id,
            device_token,
        };
        let contents = serde_json::to_string_pretty(&stored)
            .map_err(|e| DeviceError::Token(e.to_string()))?;
        fs::write(path, contents)
            .map_err(|e| DeviceError::Token(format!("cannot write {}: {}", path.display(), e)))?;
        info!(token_file = %path.display(), "registered new device");
        Ok(stored.device_token)
    }

    fn ensure_session(&mut self) -> Result<(), DeviceError> {
        if self.session.is_none() {
            let device_token = self.device_token()?;
            let endpoints = &self.settings.endpoints;

            let endpoint = format!("{}/token/json/2/user/new", endpoints.auth);
            let response = self.http.post(&endpoint).bearer_auth(&device_token).send()?;
            let user_token = check(response, &endpoint)?.text()?.trim().to_string();

            let endpoint = format!("{}/service/json/1/document-storage", endpoints.service_manager);
            let response = self
                .http
                .get(&endpoint)
                .query(&[
                    ("environment", "production"),
                    ("group", "auth0|5a68dc51cb30df3877a1d7c4"),
                    ("apiVer", "2"),
                ])
                .send()?;
            let host: ServiceHost = check(response, &endpoint)?.json()?;
            if host.status != "OK" || host.host.is_empty() {
                return Err(DeviceError::Malformed {
                    endpoint,
                    reason: format!("no storage host (status {})", host.status),
                });
            }
            let storage = if host.host.starts_with("http") {
                host.host
            } else {
                format!("https://{}", host.host)
            };
            debug!(%storage, "renewed user token");
            self.session = Some(Session {
                user_token,
                storage,
            });
        }
        Ok(())
    }

    /// Send a request to the storage host, authenticated with the user token.
    fn storage(
        &mut self,
        build: impl FnOnce(&Client, &str) -> RequestBuilder,
        path: &str,
    ) -> Result<Response, DeviceError> {
        self.ensure_session()?;
        let Some(session) = self.session.as_ref() else {
            return Err(DeviceError::Token(String::from("no session")));
        };
        let endpoint = format!("{}{}", session.storage, path);
        let response = build(&self.http, &endpoint)
            .bearer_auth(&session.user_token)
            .send()?;
        check(response, &endpoint)
    }

    fn items(&mut self) -> Result<Vec<Item>, DeviceError> {
        Ok(self
            .storage(|http, url| http.get(url), "/document-storage/json/2/docs")?
            .json()?)
    }

    fn create_folder(&mut self, name: &str) -> Result<String, DeviceError> {
        let id = Uuid::new_v4().to_string();
        let request = json!([{ "ID": id, "Type": FOLDER_TYPE, "Version": 1 }]);
        let results: Vec<ItemResult> = self
            .storage(
                |http, url| http.put(url).json(&request),
                "/document-storage/json/2/upload/request",
            )?
            .json()?;
        expect_success(&results, "upload/request")?;

        let metadata = json!([{
            "ID": id,
            "Type": FOLDER_TYPE,
            "Version": 1,
            "VissibleName": name,
            "Parent": "",
            "ModifiedClient": Utc::now().to_rfc3339(),
        }]);
        let results: Vec<ItemResult> = self
            .storage(
                |http, url| http.put(url).json(&metadata),
                "/document-storage/json/2/upload/update-status",
            )?
            .json()?;
        expect_success(&results, "upload/update-status")?;
        info!(folder = name, %id, "created folder");
        Ok(id)
    }

    fn folder_id(&mut self, name: &str) -> Result<String, DeviceError> {
        if let Some(id) = self.folders.get(name) {
            return Ok(id.clone());
        }
        let items = self.items()?;
        let id = match find_folder(&items, name) {
            Some(folder) => folder.id.clone(),
            None => self.create_folder(name)?,
        };
        self.folders.insert(name.to_string(), id.clone());
        Ok(id)
    }
}

impl Device for RemarkableClient {
    fn upload(&mut self, document: &PdfDocument, folder: &str) -> Result<String, DeviceError> {
        let parent = self.folder_id(folder)?;
        let meta = upload_meta(&document.title, &parent);
        let bytes = document.bytes.clone();
        let uploaded: Uploaded = self
            .storage(
                |http, url| {
                    http.post(url)
                        .header("rm-meta", meta)
                        .header("rm-source", "RoR-Browser")
                        .header(reqwest::header::CONTENT_TYPE, "application/pdf")
                        .body(bytes)
                },
                "/doc/v2/files",
            )?
            .json()?;
        Ok(uploaded.doc_id)
    }

    fn delete(&mut self, remote_document_id: &str) -> Result<DeleteOutcome, DeviceError> {
        let items = self.items()?;
        let Some(item) = items.iter().find(|item| item.id == remote_document_id) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let request = json!([{ "ID": item.id, "Version": item.version }]);
        let results: Vec<ItemResult> = self
            .storage(
                |http, url| http.put(url).json(&request),
                "/document-storage/json/2/delete",
            )?
            .json()?;
        expect_success(&results, "delete")?;
        Ok(DeleteOutcome::Deleted)
    }

    fn list_folder(&mut self, folder: &str) -> Result<Option<Vec<String>>, DeviceError> {
        let items = self.items()?;
        let Some(folder) = find_folder(&items, folder) else {
            return Ok(None);
        };
        self.folders.insert(folder.name.clone(), folder.id.clone());
        Ok(Some(
            items
                .iter()
                .filter(|item| item.kind == DOCUMENT_TYPE && item.parent == folder.id)
                .map(|item| item.id.clone())
                .collect(),
        ))
    }
}

/// Map authentication failures and other non-success statuses to errors.
fn check(response: Response, endpoint: &str) -> Result<Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(DeviceError::Unauthorized(format!("{} answered {}", endpoint, status)));
    }
    Err(DeviceError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn expect_success(results: &[ItemResult], endpoint: &str) -> Result<(), DeviceError> {
    match results.first() {
        Some(result) if result.success => Ok(()),
        Some(result) => Err(DeviceError::Malformed {
            endpoint: endpoint.to_string(),
            reason: result.message.clone(),
        }),
        None => Err(DeviceError::Malformed {
            endpoint: endpoint.to_string(),
            reason: String::from("empty result list"),
        }),
    }
}

fn find_folder<'a>(items: &'a [Item], name: &str) -> Option<&'a Item> {
    items
        .iter()
        .find(|item| item.kind == FOLDER_TYPE && item.name == name && item.parent != "trash")
}

/// The `rm-meta` header: base64 of the JSON naming the file and its parent folder.
fn upload_meta(title: &str, parent: &str) -> String {
    BASE64.encode(json!({ "file_name": title, "parent": parent }).to_string())
}
