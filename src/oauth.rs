// ABOUTME: Browser-based OAuth2 consent with a one-shot local callback server
// ABOUTME: Waits for exactly one callback, exchanges the code, stages the refresh token

use crate::{
    accounts::AccountRegistry,
    google::{AuthorizedClient, GoogleOAuth},
    Error, Result,
};
use rand::{distributions::Alphanumeric, Rng};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const CALLBACK_PATH: &str = "/oauth2callback";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 16 * 1024;

const SUCCESS_PAGE: &str = "<!doctype html><html><body>\
<h1>Authorization complete</h1><p>You can close this window and return to the terminal.</p>\
</body></html>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingBrowserConsent,
    AwaitingCallback,
    Completed,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    pub fn parse(query: &str) -> Self {
        let mut params = CallbackParams::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Loopback listener for the provider redirect.
///
/// `localhost` may resolve to either loopback address, so the port is held on
/// `127.0.0.1` and, where the host has IPv6, on `[::1]` as well.
/// [`CallbackServer::accept`] takes `self`, so the listeners are closed
/// exactly once no matter how the wait ends.
pub struct CallbackServer {
    listeners: Vec<TcpListener>,
    port: u16,
}

impl CallbackServer {
    pub fn bind(port: u16) -> Result<Self> {
        let ipv4 = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        let port = ipv4.local_addr()?.port();
        let mut listeners = vec![ipv4];

        match TcpListener::bind((Ipv6Addr::LOCALHOST, port)) {
            Ok(ipv6) => listeners.push(ipv6),
            Err(e) => warn!(port, error = %e, "could not bind [::1], listening on IPv4 only"),
        }

        debug!(port, stacks = listeners.len(), "callback listener bound");
        Ok(CallbackServer { listeners, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Block until a request for the callback path arrives or `timeout` passes.
    /// Requests for any other path get a 404 and the wait goes on.
    pub fn accept(self, timeout: Duration) -> Result<Callback> {
        for listener in &self.listeners {
            listener.set_nonblocking(true)?;
        }
        let deadline = Instant::now() + timeout;

        loop {
            let mut idle = true;
            for listener in &self.listeners {
                let (mut stream, peer) = match listener.accept() {
                    Ok(accepted) => accepted,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e.into()),
                };
                idle = false;
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(READ_TIMEOUT))?;

                match read_request_target(&mut stream) {
                    Ok(Some(target)) => {
                        let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
                        if path == CALLBACK_PATH {
                            debug!(%peer, "callback received");
                            return Ok(Callback {
                                stream,
                                params: CallbackParams::parse(query),
                            });
                        }
                        debug!(%peer, path, "ignoring request for unrelated path");
                        let _ = write_response(&mut stream, "404 Not Found", "Not found");
                    }
                    Ok(None) => debug!(%peer, "ignoring malformed request"),
                    Err(e) => debug!(%peer, error = %e, "failed reading request"),
                }
            }

            if idle {
                if Instant::now() >= deadline {
                    return Err(Error::AuthorizationFailed(format!(
                        "timed out after {}s waiting for the browser callback",
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// The one accepted callback request, still holding its connection so the
/// outcome page can be served once the code exchange is done.
pub struct Callback {
    stream: TcpStream,
    pub params: CallbackParams,
}

impl Callback {
    pub fn respond_success(mut self) -> Result<()> {
        write_response(&mut self.stream, "200 OK", SUCCESS_PAGE)
    }

    pub fn respond_failure(mut self, reason: &str) -> Result<()> {
        let page = format!(
            "<!doctype html><html><body><h1>Authorization failed</h1><p>{}</p></body></html>",
            escape_html(reason)
        );
        write_response(&mut self.stream, "400 Bad Request", &page)
    }
}

fn read_request_target(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Result of a completed consent: a client usable right away, and whether a
/// refresh token was staged for the registry.
pub struct Authorized {
    pub client: AuthorizedClient,
    pub refresh_token_staged: bool,
}

pub struct AuthorizationFlow<'a> {
    oauth: &'a GoogleOAuth,
    port: u16,
    timeout: Duration,
    state: FlowState,
}

impl<'a> AuthorizationFlow<'a> {
    pub fn new(oauth: &'a GoogleOAuth, port: u16, timeout: Duration) -> Self {
        AuthorizationFlow {
            oauth,
            port,
            timeout,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Run the whole consent. The listener is bound before `open_browser` is
    /// called with the consent URL; a failing opener is only logged, since
    /// the user can still paste the URL by hand.
    pub fn run<F>(
        &mut self,
        registry: &AccountRegistry<'_>,
        full_drive: bool,
        open_browser: F,
    ) -> Result<Authorized>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        let server = match CallbackServer::bind(self.port) {
            Ok(server) => server,
            Err(e) => {
                self.transition(FlowState::Failed);
                return Err(e);
            }
        };
        let redirect_uri = server.redirect_uri();
        let csrf = random_state();
        let consent_url = self
            .oauth
            .authorization_url(&redirect_uri, full_drive, &csrf)?;

        self.transition(FlowState::AwaitingBrowserConsent);
        if let Err(e) = open_browser(&consent_url) {
            warn!(error = %e, "could not open the browser");
        }

        self.transition(FlowState::AwaitingCallback);
        let callback = match server.accept(self.timeout) {
            Ok(callback) => callback,
            Err(e) => {
                self.transition(FlowState::Failed);
                return Err(e);
            }
        };

        let outcome = self.complete(registry, &callback.params, &redirect_uri, &csrf);
        let served = match &outcome {
            Ok(_) => callback.respond_success(),
            Err(e) => callback.respond_failure(&e.to_string()),
        };
        if let Err(e) = served {
            warn!(error = %e, "could not serve the callback page");
        }

        self.transition(if outcome.is_ok() {
            FlowState::Completed
        } else {
            FlowState::Failed
        });
        outcome
    }

    fn complete(
        &self,
        registry: &AccountRegistry<'_>,
        params: &CallbackParams,
        redirect_uri: &str,
        csrf: &str,
    ) -> Result<Authorized> {
        if let Some(error) = &params.error {
            return Err(Error::AuthorizationFailed(format!(
                "provider returned '{}'",
                error
            )));
        }
        if params.state.as_deref() != Some(csrf) {
            return Err(Error::AuthorizationFailed(
                "state mismatch in callback, please try again".into(),
            ));
        }
        let code = params.code.as_deref().ok_or_else(|| {
            Error::AuthorizationFailed("callback did not include an authorization code".into())
        })?;

        let grant = self
            .oauth
            .exchange_code(code, redirect_uri)
            .map_err(|e| Error::AuthorizationFailed(format!("code exchange failed: {}", e)))?;

        let refresh_token_staged = match &grant.refresh_token {
            Some(refresh_token) => {
                registry.stage_refresh_token(refresh_token)?;
                true
            }
            None => false,
        };

        Ok(Authorized {
            client: self.oauth.authorized(grant.access_token),
            refresh_token_staged,
        })
    }

    fn transition(&mut self, next: FlowState) {
        info!(from = ?self.state, to = ?next, "authorization flow");
        self.state = next;
    }
}
