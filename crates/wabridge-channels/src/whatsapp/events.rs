//! Mapping from `whatsapp-rust` events to lifecycle events.

use wabridge_core::event::{ClientEvent, CloseReason, InboundMessage, UserInfo};
use wacore::types::events::Event;
use whatsapp_rust::client::Client;

/// Every way the client reports that the stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Disconnect {
    /// Socket dropped without a reason.
    Dropped,
    LoggedOut,
    /// Another client took over this session.
    Replaced,
    TemporaryBan,
    /// Server refused the login; carries the failure code when numeric.
    ConnectFailure(Option<u16>),
    /// `<stream:error>` from the server; carries its code when numeric.
    StreamError(Option<u16>),
}

pub(super) fn close_reason(disconnect: Disconnect) -> CloseReason {
    match disconnect {
        Disconnect::Dropped => CloseReason::ConnectionClosed,
        Disconnect::LoggedOut => CloseReason::LoggedOut,
        Disconnect::Replaced => CloseReason::ConnectionReplaced,
        Disconnect::TemporaryBan => CloseReason::Forbidden,
        Disconnect::ConnectFailure(code) | Disconnect::StreamError(code) => code
            .map(CloseReason::from_status_code)
            .unwrap_or(CloseReason::Unknown(None)),
    }
}

/// Numeric status code out of whatever the client reports (`"515"`, `401`).
pub(super) fn status_code(raw: impl ToString) -> Option<u16> {
    raw.to_string().trim().parse().ok()
}

/// Account identity from the phone-number JID user part and push name.
pub(super) fn user_info(user: &str, push_name: &str) -> UserInfo {
    let name = push_name.trim();
    UserInfo {
        id: user.to_string(),
        name: (!name.is_empty()).then(|| name.to_string()),
    }
}

/// Account behind the client, if it has been paired.
pub(super) async fn own_user(client: &Client) -> Option<UserInfo> {
    let jid = client.get_pn().await?;
    let push_name = client.get_push_name().await;
    Some(user_info(&jid.user, &push_name))
}

/// Text body of a message, looking through device-sent, ephemeral and
/// view-once wrappers.
pub(super) fn message_text(msg: &waproto::whatsapp::Message) -> Option<String> {
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg);

    inner.conversation.clone().or_else(|| {
        inner
            .extended_text_message
            .as_ref()
            .and_then(|e| e.text.clone())
    })
}

fn closed(disconnect: Disconnect) -> Option<ClientEvent> {
    Some(ClientEvent::Close(close_reason(disconnect)))
}

/// Translate a client event; `None` for everything the bridge ignores.
///
/// `Connected` comes back as `Open(None)`; the caller fills in the account
/// with [`own_user`] since that needs the client.
pub(super) fn translate(event: Event) -> Option<ClientEvent> {
    match event {
        Event::PairingQrCode { code, .. } => Some(ClientEvent::PairingCode(code)),
        Event::PairSuccess(_) => Some(ClientEvent::CredentialsUpdated),
        Event::Connected(_) => Some(ClientEvent::Open(None)),
        Event::LoggedOut(_) => closed(Disconnect::LoggedOut),
        Event::Disconnected(_) => closed(Disconnect::Dropped),
        Event::StreamReplaced(_) => closed(Disconnect::Replaced),
        Event::TemporaryBan(_) => closed(Disconnect::TemporaryBan),
        Event::ConnectFailure(failure) => {
            closed(Disconnect::ConnectFailure(status_code(failure.reason.code())))
        }
        Event::StreamError(error) => closed(Disconnect::StreamError(status_code(&error.code))),
        Event::Message(msg, info) => Some(ClientEvent::Inbound(InboundMessage {
            id: info.id.clone(),
            from: info.source.sender.user.clone(),
            text: message_text(&msg),
            timestamp: chrono::Utc::now(),
        })),
        _ => None,
    }
}
