use async_trait::async_trait;
use chat_core::{ChatId, Config, Credential};
use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Proxy, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::client_trait::ChatBackend;
use crate::error::{BackendError, Result};
use crate::models::{
    ChatRequest, ChatResponse, ChatSummary, CreateChatRequest, CreateChatResponse,
    MessagesResponse, SessionRequest, StoredMessage,
};

/// Build the HTTP client shared by the backend and stream clients.
pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder().default_headers(default_headers());
    if !config.http_proxy.is_empty() {
        builder = builder.proxy(Proxy::http(&config.http_proxy)?);
    }
    if !config.https_proxy.is_empty() {
        builder = builder.proxy(Proxy::https(&config.https_proxy)?);
    }
    Ok(builder.build()?)
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "user-agent",
        HeaderValue::from_static(concat!("calmbuddy/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}

#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(build_http_client(config)?, config.api_base()))
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/chats/{chat_id}[/{tail}]` with the id as one encoded segment.
    fn chat_url(&self, chat_id: &ChatId, tail: Option<&str>) -> Result<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("chats")
            .push(chat_id.as_str())
            .extend(tail);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.header(ACCEPT, "application/json").send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("Backend request failed with status {}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized(body)),
        _ => Err(BackendError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatList {
    Bare(Vec<ChatSummary>),
    Wrapped { chats: Vec<ChatSummary> },
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_chats(&self, credential: &Credential) -> Result<Vec<ChatSummary>> {
        let response = self
            .send(
                self.client
                    .get(self.url("/chats"))
                    .bearer_auth(credential.expose()),
            )
            .await?;
        let chats = match response.json::<ChatList>().await? {
            ChatList::Bare(chats) | ChatList::Wrapped { chats } => chats,
        };
        debug!("Listed {} chats", chats.len());
        Ok(chats)
    }

    async fn create_chat(&self, credential: &Credential, is_journal: bool) -> Result<ChatId> {
        let response = self
            .send(
                self.client
                    .post(self.url("/chats"))
                    .bearer_auth(credential.expose())
                    .json(&CreateChatRequest { is_journal }),
            )
            .await?;
        let created: CreateChatResponse = response.json().await?;
        info!("Created chat {}", created.chat_id);
        Ok(created.chat_id)
    }

    async fn load_messages(
        &self,
        credential: &Credential,
        chat_id: &ChatId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let response = self
            .send(
                self.client
                    .get(self.chat_url(chat_id, Some("messages"))?)
                    .query(&[("limit", limit)])
                    .bearer_auth(credential.expose()),
            )
            .await?;
        let body: MessagesResponse = response.json().await?;
        debug!("Loaded {} messages for chat {}", body.messages.len(), chat_id);
        Ok(body.messages)
    }

    async fn delete_chat(&self, credential: &Credential, chat_id: &ChatId) -> Result<()> {
        self.send(
            self.client
                .delete(self.chat_url(chat_id, None)?)
                .bearer_auth(credential.expose()),
        )
        .await?;
        info!("Deleted chat {}", chat_id);
        Ok(())
    }

    async fn reset_session(&self, session_id: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.url("/chatbot/reset"))
                .json(&SessionRequest { session_id }),
        )
        .await?;
        info!("Reset guest session {}", session_id);
        Ok(())
    }

    async fn chat(&self, session_id: &str, message: &str) -> Result<String> {
        let response = self
            .send(
                self.client
                    .post(self.url("/chatbot/chat"))
                    .json(&ChatRequest {
                        session_id,
                        message,
                    }),
            )
            .await?;
        let reply: ChatResponse = response.json().await?;
        Ok(reply.response)
    }

    fn stream_endpoint(&self) -> String {
        self.url("/chatbot/stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ids_are_encoded_as_one_segment() {
        let backend = HttpChatBackend::new(Client::new(), "http://localhost:5000");
        let url = backend
            .chat_url(&ChatId::from("a/b?x"), Some("messages"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/chats/a%2Fb%3Fx/messages");

        let url = backend.chat_url(&ChatId::from("7"), None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/chats/7");
    }

    #[test]
    fn chat_urls_keep_base_path() {
        let backend = HttpChatBackend::new(Client::new(), "http://localhost:5000/api/");
        let url = backend.chat_url(&ChatId::from("7"), None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/chats/7");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpChatBackend::new(Client::new(), "http://localhost:5000/");
        assert_eq!(backend.base_url(), "http://localhost:5000");
        assert_eq!(
            backend.stream_endpoint(),
            "http://localhost:5000/chatbot/stream"
        );
    }

    #[test]
    fn from_config_uses_api_base() {
        let mut config = Config::default();
        config.api_base = Some("http://backend.test".into());
        let backend = HttpChatBackend::from_config(&config).unwrap();
        assert_eq!(backend.base_url(), "http://backend.test");
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let mut config = Config::default();
        config.http_proxy = "not a url".into();
        assert!(build_http_client(&config).is_err());
    }
}
