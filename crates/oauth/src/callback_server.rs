//! Local HTTP receiver for the provider's redirect back to `redirect_uri`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Query, State},
        response::Html,
        routing::get,
    },
    tokio::{
        net::TcpListener,
        sync::{Mutex, oneshot},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{error::OAuthError, types::CallbackParams};

const DONE_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>Tollgate</title></head>\
<body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\">\
<h2>Authorization complete</h2><p>You can close this tab.</p></body></html>";

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// A bound, not yet serving, redirect receiver.
///
/// Binding is split from waiting so the port is known (and owned) before the
/// browser is sent anywhere.
pub struct CallbackServer {
    listener: TcpListener,
    path: String,
}

impl CallbackServer {
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self, OAuthError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            OAuthError::Callback(format!("failed to bind callback server on {addr}: {e}"))
        })?;
        let path = if path.is_empty() { "/" } else { path };
        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, OAuthError> {
        self.listener
            .local_addr()
            .map_err(|e| OAuthError::Callback(e.to_string()))
    }

    /// Serve until the first callback arrives, the token is cancelled, or the
    /// timeout elapses. Cancellation and timeout map to `AuthorizationDenied`.
    pub async fn wait(
        self,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<CallbackParams, OAuthError> {
        let (tx, rx) = oneshot::channel();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(sender);

        let shutdown = cancel.child_token();
        let server_shutdown = shutdown.clone();
        let server = tokio::spawn(async move {
            let serve = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "callback server stopped with error");
            }
        });

        let outcome = tokio::select! {
            received = rx => received
                .map_err(|_| OAuthError::Callback("callback channel closed".into())),
            () = cancel.cancelled() => Err(OAuthError::AuthorizationDenied(
                "authorization cancelled".into(),
            )),
            () = tokio::time::sleep(timeout) => Err(OAuthError::AuthorizationDenied(format!(
                "no authorization callback within {}s",
                timeout.as_secs()
            ))),
        };

        shutdown.cancel();
        if let Err(e) = server.await {
            debug!(error = %e, "callback server task ended abnormally");
        }
        outcome
    }
}

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(params);
    } else {
        debug!("ignoring duplicate authorization callback");
    }
    Html(DONE_PAGE)
}
