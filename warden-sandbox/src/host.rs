//! Host functions behind each capability, and the store state they run in.
//!
//! Guest memory is addressed by `(ptr, len)` pairs. Results flowing back to
//! the guest are written into a buffer the guest hands out from its own
//! `alloc` export and returned packed as `(ptr << 32) | len`.

use crate::capabilities::Capability;
use crate::error::{SandboxError, SandboxResult};
use crate::limiter::TrackingLimiter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use warden_security::SecurityValidator;
use wasmtime::{Caller, Extern, Linker, Memory};

/// Longest plugin log line re-emitted; the rest is dropped.
const MAX_LOG_BYTES: i32 = 4096;

/// State stored in each call's `wasmtime::Store`.
pub(crate) struct HostState {
    pub limiter: TrackingLimiter,
    pub tenant_id: String,
    pub plugin_id: String,
    /// Present only when the http capability is granted.
    pub http: Option<HttpBridge>,
    /// Upper bound on any single guest buffer the host reads.
    pub max_read_bytes: usize,
}

/// Outbound HTTP for the `warden:http` capability.
pub(crate) struct HttpBridge {
    pub client: reqwest::Client,
    pub runtime: tokio::runtime::Handle,
    pub validator: Arc<SecurityValidator>,
    pub request_timeout: Duration,
    /// Wall-clock deadline of the whole action.
    pub deadline: Instant,
}

pub(crate) fn pack(ptr: i32, len: i32) -> i64 {
    (((ptr as u32 as u64) << 32) | len as u32 as u64) as i64
}

pub(crate) fn unpack(packed: i64) -> (u32, u32) {
    let packed = packed as u64;
    ((packed >> 32) as u32, packed as u32)
}

/// Registers the host functions of one capability.
pub(crate) fn link(linker: &mut Linker<HostState>, capability: Capability) -> SandboxResult<()> {
    let module = capability.module_name();
    let linked = match capability {
        Capability::Logger => linker
            .func_wrap(
                module,
                "log",
                |caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
                    host_log(caller, level, ptr, len)
                },
            )
            .map(|_| ()),
        Capability::Hash => linker
            .func_wrap(
                module,
                "sha256",
                |caller: Caller<'_, HostState>, ptr: i32, len: i32| host_sha256(caller, ptr, len),
            )
            .map(|_| ()),
        Capability::Http => linker
            .func_wrap(
                module,
                "fetch",
                |caller: Caller<'_, HostState>, ptr: i32, len: i32| host_fetch(caller, ptr, len),
            )
            .map(|_| ()),
    };
    linked.map_err(|e| SandboxError::Initialization(format!("link {module}: {e}")))
}

fn trap(message: impl Into<String>) -> wasmtime::Error {
    wasmtime::Error::msg(message.into())
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> wasmtime::Result<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => Err(trap("guest does not export memory")),
    }
}

fn read_guest(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<Vec<u8>> {
    let (Ok(offset), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(trap("negative guest pointer or length"));
    };
    if len > caller.data().max_read_bytes {
        return Err(trap(format!("guest buffer of {len} bytes exceeds host limit")));
    }
    let memory = guest_memory(caller)?;
    let mut buf = vec![0u8; len];
    memory
        .read(&*caller, offset, &mut buf)
        .map_err(|e| trap(e.to_string()))?;
    Ok(buf)
}

fn write_guest(caller: &mut Caller<'_, HostState>, bytes: &[u8]) -> wasmtime::Result<i64> {
    let alloc = match caller.get_export("alloc") {
        Some(Extern::Func(func)) => func.typed::<i32, i32>(&*caller)?,
        _ => return Err(trap("guest does not export alloc")),
    };
    let len = i32::try_from(bytes.len()).map_err(|_| trap("host result too large"))?;
    let ptr = alloc.call(&mut *caller, len)?;
    let offset = usize::try_from(ptr).map_err(|_| trap("guest alloc returned a negative pointer"))?;
    let memory = guest_memory(caller)?;
    memory
        .write(&mut *caller, offset, bytes)
        .map_err(|e| trap(e.to_string()))?;
    Ok(pack(ptr, len))
}

// ── Logger ──────────────────────────────────────────────────────

fn host_log(
    mut caller: Caller<'_, HostState>,
    level: i32,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<()> {
    let bytes = read_guest(&mut caller, ptr, len.min(MAX_LOG_BYTES))?;
    let message = String::from_utf8_lossy(&bytes);
    let state = caller.data();
    let tenant_id = state.tenant_id.as_str();
    let plugin_id = state.plugin_id.as_str();
    match level {
        i32::MIN..=0 => trace!(target: "warden::plugin", tenant_id, plugin_id, "{message}"),
        1 => debug!(target: "warden::plugin", tenant_id, plugin_id, "{message}"),
        2 => info!(target: "warden::plugin", tenant_id, plugin_id, "{message}"),
        3 => warn!(target: "warden::plugin", tenant_id, plugin_id, "{message}"),
        _ => error!(target: "warden::plugin", tenant_id, plugin_id, "{message}"),
    }
    Ok(())
}

// ── Hash ────────────────────────────────────────────────────────

fn host_sha256(mut caller: Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<i64> {
    let bytes = read_guest(&mut caller, ptr, len)?;
    let digest = hex::encode(Sha256::digest(&bytes));
    write_guest(&mut caller, digest.as_bytes())
}

// ── HTTP ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FetchRequest {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FetchResponse {
    Ok {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    Err {
        error: String,
    },
}

impl FetchResponse {
    fn error(message: impl Into<String>) -> Self {
        Self::Err {
            error: message.into(),
        }
    }
}

fn host_fetch(mut caller: Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<i64> {
    let bytes = read_guest(&mut caller, ptr, len)?;
    let response = match serde_json::from_slice::<FetchRequest>(&bytes) {
        Ok(request) => {
            let state = caller.data();
            match state.http.as_ref() {
                Some(bridge) => bridge.fetch(request, state.max_read_bytes),
                None => FetchResponse::error("http capability is not available"),
            }
        }
        Err(e) => FetchResponse::error(format!("invalid fetch request: {e}")),
    };
    let encoded = serde_json::to_vec(&response).map_err(|e| trap(e.to_string()))?;
    write_guest(&mut caller, &encoded)
}

impl HttpBridge {
    /// Runs one request on the async runtime; the calling thread is a
    /// blocking-pool thread, so `block_on` is allowed here.
    fn fetch(&self, request: FetchRequest, max_body: usize) -> FetchResponse {
        if !self.validator.is_url_trusted(&request.url) {
            warn!(url = %request.url, "plugin fetch blocked: untrusted url");
            return FetchResponse::error("url is not trusted");
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return FetchResponse::error("execution deadline reached");
        }
        let Ok(method) = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        else {
            return FetchResponse::error("invalid http method");
        };

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .timeout(self.request_timeout.min(remaining));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let result = self.runtime.block_on(async move {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
                .collect();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        });

        match result {
            Ok((status, headers, body)) if body.len() <= max_body => FetchResponse::Ok {
                status,
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            },
            Ok(_) => FetchResponse::error("response body too large"),
            Err(e) => {
                debug!(url = %request.url, error = %e, "plugin fetch failed");
                FetchResponse::error("request failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips_high_pointers() {
        let packed = pack(i32::MAX, 17);
        assert_eq!(unpack(packed), (i32::MAX as u32, 17));
        assert_eq!(unpack(pack(-8, 3)), (u32::MAX - 7, 3));
    }

    #[test]
    fn fetch_response_shapes() {
        let err = serde_json::to_value(FetchResponse::error("nope")).unwrap();
        assert_eq!(err, serde_json::json!({"error": "nope"}));
        let ok = serde_json::to_value(FetchResponse::Ok {
            status: 200,
            headers: BTreeMap::new(),
            body: "hi".into(),
        })
        .unwrap();
        assert_eq!(ok["status"], 200);
    }
}
