//! WhatsApp Web transport: pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web.
//! Credentials are persisted to `{session_dir}/whatsapp.db` by the client.

mod events;


use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use wabridge_core::{
    error::BridgeError,
    event::{ClientEvent, EventSink},
    traits::{Session, Transport},
};
use wacore_binary::jid::Jid;
use whatsapp_rust::bot::Bot;
use whatsapp_rust::client::Client;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

/// File inside the session directory holding the client's SQLite store.
pub const SESSION_DB_FILE: &str = "whatsapp.db";

/// Opens `whatsapp-rust` bots against a session directory.
pub struct WhatsAppTransport {
    device_name: String,
}

impl WhatsAppTransport {
    /// `device_name` is what the phone shows under Linked devices.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp-web"
    }

    async fn open(
        &self,
        session_dir: &Path,
        sink: EventSink,
    ) -> Result<Arc<dyn Session>, BridgeError> {
        let db_path = session_dir.join(SESSION_DB_FILE);
        let db_path = db_path.to_string_lossy().into_owned();
        info!("WhatsApp bot building (session: {db_path})...");

        let backend = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .map_err(|e| BridgeError::Transport(format!("whatsapp store init failed: {e}")))?,
        );

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let sink = sink.clone();
                async move {
                    let Some(mut event) = events::translate(event) else {
                        return;
                    };
                    if let ClientEvent::Open(user) = &mut event {
                        *user = events::own_user(&client).await;
                    }
                    sink.emit(event).await;
                }
            })
            .build()
            .await
            .map_err(|e| BridgeError::Transport(format!("whatsapp bot build failed: {e}")))?;

        let client = bot.client();

        // Run bot in background.
        let handle = bot
            .run()
            .await
            .map_err(|e| BridgeError::Transport(format!("whatsapp bot run failed: {e}")))?;

        info!("WhatsApp bot started");
        Ok(Arc::new(WhatsAppSession {
            client,
            task: Mutex::new(Some(handle.abort_handle())),
        }))
    }
}

/// A running bot plus the client used for sending.
pub struct WhatsAppSession {
    client: Arc<Client>,
    task: Mutex<Option<AbortHandle>>,
}

#[async_trait]
impl Session for WhatsAppSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, BridgeError> {
        if self.task.lock().await.is_none() {
            return Err(BridgeError::Transport("whatsapp session closed".into()));
        }

        let jid: Jid = jid
            .parse()
            .map_err(|e| BridgeError::Transport(format!("invalid whatsapp JID '{jid}': {e}")))?;

        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        self.client
            .send_message(jid, msg)
            .await
            .map_err(|e| BridgeError::Transport(format!("whatsapp send failed: {e}")))
    }

    async fn close(&self) {
        if let Some(task) = self.task.lock().await.take() {
            debug!("stopping WhatsApp bot task");
            task.abort();
        }
    }
}
