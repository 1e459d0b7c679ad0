//! Поддельные провайдеры и одноразовый HTTP-сервер для тестов

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::config::ProviderKind;
use crate::error::{NarrationError, Result};
use crate::tts::SpeechProvider;

/// (голос, текст) каждого вызова
pub(crate) type Calls = Arc<Mutex<Vec<(String, String)>>>;

pub(crate) struct FakeProvider {
    kind: ProviderKind,
    max_chars: usize,
    fail_status: Option<u16>,
    calls: Calls,
}

impl FakeProvider {
    pub(crate) fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            max_chars: 4000,
            fail_status: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub(crate) fn failing_with(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    pub(crate) fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

#[async_trait]
impl SpeechProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()> {
        self.calls.lock().push((voice_id.to_string(), text.to_string()));
        if let Some(status) = self.fail_status {
            return Err(NarrationError::Provider {
                provider: self.kind.as_str().to_string(),
                status,
                body: "fake failure".to_string(),
            });
        }
        tokio::fs::write(output, format!("{}:{}", voice_id, text)).await?;
        Ok(())
    }
}

/// Ответить один раз заданным статусом и телом; возвращает базовый URL
/// и канал, в который придёт тело запроса.
pub(crate) async fn serve_once(status: u16, body: &'static [u8]) -> (String, tokio::sync::oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (sender, receiver) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buffer = [0u8; 4096];

        loop {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);
            if let Some(header_end) = find_header_end(&request) {
                let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    let payload = String::from_utf8_lossy(&request[header_end + 4..]).to_string();
                    let _ = sender.send(payload);
                    break;
                }
            }
        }

        let head = format!(
            "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (format!("http://{}", address), receiver)
}

fn find_header_end(request: &[u8]) -> Option<usize> {
    request.windows(4).position(|window| window == b"\r\n\r\n")
}
