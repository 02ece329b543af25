use crate::models::ObsSettings;
use crate::obs::protocol::{
    self, Envelope, Hello, OP_EVENT, OP_HELLO, OP_IDENTIFIED, OP_REQUEST_RESPONSE,
    RequestResponse,
};
use crate::obs::{ControlApi, ControlError, InputSettings};
use serde_json::{Value, json};
use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use uuid::Uuid;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Blocking obs-websocket v5 client
///
/// Holds at most one open socket. Every call locks the socket for a full
/// request/response exchange, so calls from different threads never
/// interleave on the wire.
///
/// A transport failure drops the socket: later calls fail with
/// [`ControlError::NotConnected`] until [`connect`](ControlApi::connect) is
/// called again.
pub struct ObsClient {
    settings: ObsSettings,
    socket: Mutex<Option<Socket>>,
}

impl ObsClient {
    pub fn new(settings: ObsSettings) -> Self {
        Self {
            settings,
            socket: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ObsSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Option<Socket>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timeout(&self) -> Option<Duration> {
        (self.settings.timeout_secs > 0).then(|| Duration::from_secs(self.settings.timeout_secs))
    }

    fn apply_timeout(socket: &Socket, timeout: Option<Duration>) -> Result<(), ControlError> {
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(timeout)
                .and_then(|_| stream.set_write_timeout(timeout))
                .map_err(tungstenite::Error::Io)?;
        }
        Ok(())
    }

    fn send(socket: &mut Socket, envelope: &Envelope) -> Result<(), ControlError> {
        let text = serde_json::to_string(envelope)?;
        socket.send(Message::text(text))?;
        Ok(())
    }

    /// Read the next JSON message, skipping control frames.
    fn receive(socket: &mut Socket) -> Result<Envelope, ControlError> {
        loop {
            match socket.read()? {
                Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
                Message::Binary(bytes) => return Ok(serde_json::from_slice(&bytes)?),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} ({})", f.reason, u16::from(f.code)))
                        .unwrap_or_else(|| "no reason given".to_string());
                    return Err(ControlError::Protocol(format!(
                        "connection closed by OBS: {}",
                        reason
                    )));
                }
                _ => continue,
            }
        }
    }

    /// Hello → Identify → Identified
    fn handshake(&self, socket: &mut Socket) -> Result<(), ControlError> {
        let hello = Self::receive(socket)?;
        if hello.op != OP_HELLO {
            return Err(ControlError::Protocol(format!(
                "expected Hello, got opcode {}",
                hello.op
            )));
        }

        let hello: Hello = serde_json::from_value(hello.d)?;
        tracing::debug!(
            "OBS hello: obs-websocket {}, rpc version {}",
            hello.obs_web_socket_version,
            hello.rpc_version
        );

        let authentication = match hello.authentication {
            Some(challenge) => {
                if !self.settings.has_password() {
                    return Err(ControlError::Authentication(
                        "OBS requires a password but none is configured".to_string(),
                    ));
                }
                Some(protocol::auth_response(&self.settings.password, &challenge))
            }
            None => None,
        };
        let authenticating = authentication.is_some();

        Self::send(socket, &protocol::identify(authentication))?;

        let identified = match Self::receive(socket) {
            Ok(message) => message,
            Err(ControlError::Protocol(reason)) if authenticating => {
                return Err(ControlError::Authentication(reason));
            }
            Err(e) => return Err(e),
        };

        if identified.op != OP_IDENTIFIED {
            return Err(ControlError::Protocol(format!(
                "expected Identified, got opcode {}",
                identified.op
            )));
        }

        let identified: protocol::Identified = serde_json::from_value(identified.d)?;
        tracing::debug!(
            "Identified with negotiated rpc version {}",
            identified.negotiated_rpc_version
        );

        Ok(())
    }

    /// Send one request and wait for its response.
    fn exchange(
        socket: &mut Socket,
        request_type: &str,
        request_data: Value,
    ) -> Result<Option<Value>, ControlError> {
        let request_id = Uuid::new_v4().to_string();
        Self::send(
            socket,
            &protocol::request(request_type, &request_id, request_data),
        )?;

        loop {
            let message = Self::receive(socket)?;
            match message.op {
                OP_REQUEST_RESPONSE => {
                    let response: RequestResponse = serde_json::from_value(message.d)?;
                    if response.request_id != request_id {
                        tracing::debug!(
                            "Ignoring response to stale request {}",
                            response.request_id
                        );
                        continue;
                    }

                    if !response.request_status.result {
                        return Err(ControlError::Request {
                            request_type: response.request_type,
                            code: response.request_status.code,
                            comment: response.request_status.comment.unwrap_or_default(),
                        });
                    }

                    return Ok(response.response_data);
                }
                OP_EVENT => continue,
                other => tracing::debug!("Ignoring message with opcode {}", other),
            }
        }
    }

    fn call(&self, request_type: &str, request_data: Value) -> Result<Option<Value>, ControlError> {
        let mut guard = self.lock();
        let socket = guard.as_mut().ok_or(ControlError::NotConnected)?;

        let result = Self::exchange(socket, request_type, request_data);

        if matches!(
            result,
            Err(ControlError::Transport(_)) | Err(ControlError::Protocol(_))
        ) {
            tracing::warn!("Dropping OBS connection after failed {}", request_type);
            *guard = None;
        }

        result
    }
}

impl ControlApi for ObsClient {
    fn connect(&self) -> Result<(), ControlError> {
        let mut guard = self.lock();
        if guard.is_some() {
            tracing::debug!("Already connected to OBS");
            return Ok(());
        }

        let url = self.settings.url();
        tracing::info!("Connecting to OBS at {}", url);

        let (mut socket, _response) =
            tungstenite::connect(url.as_str()).map_err(|e| ControlError::Connection {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        Self::apply_timeout(&socket, self.timeout())?;
        self.handshake(&mut socket)?;

        *guard = Some(socket);
        tracing::info!("Connected to OBS at {}", url);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        let Some(mut socket) = self.lock().take() else {
            return Ok(());
        };

        if let Err(e) = socket.close(None).and_then(|_| socket.flush()) {
            tracing::debug!("Error while closing OBS connection: {}", e);
        }

        tracing::info!("Disconnected from OBS");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn get_input_settings(&self, input_name: &str) -> Result<InputSettings, ControlError> {
        let data = self.call("GetInputSettings", json!({ "inputName": input_name }))?;

        match data {
            Some(Value::Object(mut data)) => match data.remove("inputSettings") {
                Some(Value::Object(settings)) => Ok(settings),
                _ => Err(ControlError::Protocol(
                    "GetInputSettings response has no inputSettings object".to_string(),
                )),
            },
            _ => Err(ControlError::Protocol(
                "GetInputSettings response has no data".to_string(),
            )),
        }
    }

    fn set_input_settings(
        &self,
        input_name: &str,
        settings: InputSettings,
        overlay: bool,
    ) -> Result<(), ControlError> {
        self.call(
            "SetInputSettings",
            json!({
                "inputName": input_name,
                "inputSettings": Value::Object(settings),
                "overlay": overlay,
            }),
        )?;
        Ok(())
    }
}
