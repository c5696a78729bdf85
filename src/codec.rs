//! Dubbo frame layer: a 16-byte header followed by a Hessian 2.0 body.
//!
//! Header layout, all integers big-endian:
//!
//! | offset | size | meaning                                             |
//! |--------|------|-----------------------------------------------------|
//! | 0..2   | 2    | magic `0xDA 0xBB`                                   |
//! | 2      | 1    | flags: request, two-way, event, serialization ID    |
//! | 3      | 1    | response status (0 on requests)                     |
//! | 4..12  | 8    | request ID                                          |
//! | 12..16 | 4    | body length                                         |

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Serialize, Serializer};

use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::tags;
use crate::value::Value;

bitflags! {
    /// Logical package classification decoded from the frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PackageType: u8 {
        const ERROR = 0x01;
        const REQUEST = 0x02;
        const RESPONSE = 0x04;
        const HEARTBEAT = 0x08;
        const REQUEST_TWOWAY = 0x10;
        const RESPONSE_EXCEPTION = 0x20;
    }
}

impl Default for PackageType {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for PackageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

/// Status byte of a response frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Serialize,
)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 20,
    ClientTimeout = 30,
    ServerTimeout = 31,
    BadRequest = 40,
    BadResponse = 50,
    ServiceNotFound = 60,
    ServiceError = 70,
    ServerError = 80,
    ClientError = 90,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DubboHeader {
    pub package_type: PackageType,
    pub serial_id: u8,
    /// Meaningful on responses only; zero on requests.
    pub response_status: u8,
    pub id: i64,
    pub body_len: usize,
}

impl DubboHeader {
    /// The decoded response status, when the byte is a known status code.
    pub fn status(&self) -> Option<ResponseStatus> {
        ResponseStatus::try_from(self.response_status).ok()
    }
}

/// The service coordinates a request is addressed to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Service {
    pub path: String,
    pub interface: String,
    pub group: String,
    pub version: String,
    pub method: String,
    pub timeout: Duration,
}

/// A decoded request body.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub dubbo_version: String,
    pub path: String,
    pub version: String,
    pub method: String,
    pub args: Vec<Value>,
    pub attachments: BTreeMap<String, String>,
}

/// A decoded response body.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub value: Value,
    pub exception: Option<String>,
    pub attachments: BTreeMap<String, String>,
}

impl RpcResponse {
    /// The payload, or the remote exception as a typed error.
    pub fn into_result(self) -> Result<Value> {
        match self.exception {
            Some(message) => Err(Error::JavaException(message)),
            None => Ok(self.value),
        }
    }
}

/// One demultiplexed inbound frame.
#[derive(Debug, Clone, Serialize)]
pub enum Message {
    Heartbeat,
    Request(RpcRequest),
    Response(RpcResponse),
}

/// Outbound body payload for [`HessianCodec::write`].
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    /// Method arguments of a request.
    Request(&'a [Value]),
    /// Payload of a response.
    Response(&'a Value),
    /// No payload (heartbeats, null responses).
    Null,
}

/// Frame reader/writer over a byte stream.
///
/// The read side buffers internally and never consumes a partial frame:
/// `read_header` peeks the 16 header bytes, confirms the whole body is
/// buffered, and only then discards the header, so `HeaderNotEnough` and
/// `BodyNotEnough` leave the stream aligned and the call idempotent.
pub struct HessianCodec<R> {
    reader: R,
    buf: Vec<u8>,
    start: usize,
    registry: Option<Arc<TypeRegistry>>,
    pkg_type: PackageType,
    body_len: usize,
}

impl<R: Read> HessianCodec<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            start: 0,
            registry: None,
            pkg_type: PackageType::empty(),
            body_len: 0,
        }
    }

    /// A codec whose encoders and decoders consult `registry`.
    pub fn with_registry(reader: R, registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new(reader)
        }
    }

    /// Pack one outbound frame.
    ///
    /// Supported package types: `HEARTBEAT` (request form while
    /// `response_status` is zero, response form otherwise), `REQUEST`,
    /// `REQUEST | REQUEST_TWOWAY` and `RESPONSE`. Anything else is
    /// [`Error::IllegalPackage`].
    pub fn write(
        &self,
        service: &Service,
        header: &DubboHeader,
        body: Body<'_>,
    ) -> Result<Vec<u8>> {
        let package_type = header.package_type;
        if package_type.contains(PackageType::HEARTBEAT) {
            if header.response_status == 0 {
                return self.pack_request(service, header, body);
            }
            return self.pack_response(header, &BTreeMap::new(), body);
        }
        if package_type.intersects(PackageType::REQUEST | PackageType::REQUEST_TWOWAY) {
            return self.pack_request(service, header, body);
        }
        if package_type == PackageType::RESPONSE {
            return self.pack_response(header, &BTreeMap::new(), body);
        }
        Err(Error::IllegalPackage("unsupported package type for write"))
    }

    fn pack_request(
        &self,
        service: &Service,
        header: &DubboHeader,
        body: Body<'_>,
    ) -> Result<Vec<u8>> {
        let package_type = header.package_type;
        let mut flags = tags::FLAG_REQUEST | serial_byte(header);
        if package_type.contains(PackageType::REQUEST_TWOWAY) {
            flags |= tags::FLAG_TWOWAY;
        }
        if package_type.contains(PackageType::HEARTBEAT) {
            flags |= tags::FLAG_EVENT;
        }
        let mut encoder = self.encoder();
        if package_type.contains(PackageType::HEARTBEAT) {
            encoder.encode(&Value::Null)?;
        } else {
            let Body::Request(args) = body else {
                return Err(Error::InvalidValue(
                    "request body must carry the argument list".into(),
                ));
            };
            encoder.encode(&Value::from(tags::DUBBO_VERSION))?;
            encoder.encode(&Value::from(service.path.as_str()))?;
            encoder.encode(&Value::from(service.version.as_str()))?;
            encoder.encode(&Value::from(service.method.as_str()))?;
            let mut descriptor = String::new();
            for arg in args {
                descriptor.push_str(&parameter_descriptor(arg));
            }
            encoder.encode(&Value::from(descriptor))?;
            for arg in args {
                encoder.encode(arg)?;
            }
            let attachments = request_attachments(service);
            encoder.encode(&attachments_value(&attachments))?;
        }
        frame(flags, 0, header.id, encoder.into_bytes())
    }

    /// Pack a response frame. Attachments, when non-empty, select the
    /// `_ATTACHMENTS` body markers.
    pub fn pack_response(
        &self,
        header: &DubboHeader,
        attachments: &BTreeMap<String, String>,
        body: Body<'_>,
    ) -> Result<Vec<u8>> {
        let package_type = header.package_type;
        let mut flags = serial_byte(header);
        if package_type.contains(PackageType::HEARTBEAT) {
            flags |= tags::FLAG_EVENT;
        }
        let status = if header.response_status == 0 {
            ResponseStatus::Ok.into()
        } else {
            header.response_status
        };
        let mut encoder = self.encoder();
        if package_type.contains(PackageType::HEARTBEAT) {
            encoder.encode(&Value::Null)?;
        } else if status != u8::from(ResponseStatus::Ok) {
            // non-OK responses carry a bare message value, no marker
            match body {
                Body::Response(value) => encoder.encode(value)?,
                Body::Null => encoder.encode(&Value::Null)?,
                Body::Request(_) => {
                    return Err(Error::InvalidValue(
                        "response body cannot carry an argument list".into(),
                    ))
                }
            }
        } else {
            let with_attachments = !attachments.is_empty();
            match body {
                Body::Response(value) if !matches!(value, &Value::Null) => {
                    let marker = if with_attachments {
                        tags::RESPONSE_VALUE_WITH_ATTACHMENTS
                    } else {
                        tags::RESPONSE_VALUE
                    };
                    encoder.encode(&Value::Int(marker))?;
                    encoder.encode(value)?;
                }
                Body::Response(_) | Body::Null => {
                    let marker = if with_attachments {
                        tags::RESPONSE_NULL_VALUE_WITH_ATTACHMENTS
                    } else {
                        tags::RESPONSE_NULL_VALUE
                    };
                    encoder.encode(&Value::Int(marker))?;
                }
                Body::Request(_) => {
                    return Err(Error::InvalidValue(
                        "response body cannot carry an argument list".into(),
                    ))
                }
            }
            if with_attachments {
                encoder.encode(&attachments_value(attachments))?;
            }
        }
        frame(flags, status, header.id, encoder.into_bytes())
    }

    /// Pack a response whose body is a remote exception message.
    pub fn pack_exception(
        &self,
        header: &DubboHeader,
        message: &str,
        attachments: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>> {
        let flags = serial_byte(header);
        let mut encoder = self.encoder();
        let with_attachments = !attachments.is_empty();
        let marker = if with_attachments {
            tags::RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS
        } else {
            tags::RESPONSE_WITH_EXCEPTION
        };
        encoder.encode(&Value::Int(marker))?;
        encoder.encode(&Value::from(message))?;
        if with_attachments {
            encoder.encode(&attachments_value(attachments))?;
        }
        frame(flags, ResponseStatus::Ok.into(), header.id, encoder.into_bytes())
    }

    /// Parse the next frame header into `header`.
    ///
    /// Fails `HeaderNotEnough` with fewer than 16 bytes available and
    /// `BodyNotEnough` when the declared body is not fully buffered; in both
    /// cases nothing is consumed and the call may be repeated once more
    /// bytes arrive.
    pub fn read_header(&mut self, header: &mut DubboHeader) -> Result<()> {
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
        if !self.fill_to(tags::HEADER_LENGTH)? {
            return Err(Error::HeaderNotEnough);
        }
        let mut raw = [0u8; tags::HEADER_LENGTH];
        raw.copy_from_slice(&self.buf[self.start..self.start + tags::HEADER_LENGTH]);

        if raw[0] != tags::MAGIC_HIGH || raw[1] != tags::MAGIC_LOW {
            return Err(Error::IllegalPackage("magic mismatch"));
        }
        let serial_id = raw[2] & tags::SERIAL_MASK;
        if serial_id == 0 {
            return Err(Error::IllegalPackage("serialization ID is zero"));
        }

        let mut package_type = PackageType::empty();
        let mut response_status = 0;
        if raw[2] & tags::FLAG_EVENT != 0 {
            package_type |= PackageType::HEARTBEAT;
        }
        if raw[2] & tags::FLAG_REQUEST != 0 {
            package_type |= PackageType::REQUEST;
            if raw[2] & tags::FLAG_TWOWAY != 0 {
                package_type |= PackageType::REQUEST_TWOWAY;
            }
        } else {
            package_type |= PackageType::RESPONSE;
            response_status = raw[3];
            if response_status != u8::from(ResponseStatus::Ok) {
                package_type |= PackageType::RESPONSE_EXCEPTION;
            }
        }

        let id = i64::from_be_bytes(raw[4..12].try_into().unwrap());
        let body_len = i32::from_be_bytes(raw[12..16].try_into().unwrap());
        if body_len < 0 {
            return Err(Error::IllegalPackage("negative body length"));
        }
        let body_len = body_len as usize;

        // confirm the body before discarding the header, so a retry after
        // BodyNotEnough still sees an aligned stream
        if !self.fill_to(tags::HEADER_LENGTH + body_len)? {
            return Err(Error::BodyNotEnough);
        }
        self.start += tags::HEADER_LENGTH;

        header.package_type = package_type;
        header.serial_id = serial_id;
        header.response_status = response_status;
        header.id = id;
        header.body_len = body_len;
        self.pkg_type = package_type;
        self.body_len = body_len;
        Ok(())
    }

    /// Consume the body announced by the last `read_header` and demultiplex
    /// it by package type.
    pub fn read_body(&mut self) -> Result<Message> {
        if self.buf.len() - self.start < self.body_len {
            return Err(Error::BodyNotEnough);
        }
        let start = self.start;
        let end = start + self.body_len;
        let result = self.decode_body(&self.buf[start..end]);
        // the frame is consumed even if its body fails to decode, keeping
        // the stream aligned on the next frame
        self.start = end;
        self.pkg_type = PackageType::empty();
        self.body_len = 0;
        result
    }

    fn decode_body(&self, body: &[u8]) -> Result<Message> {
        let package_type = self.pkg_type;
        if package_type.contains(PackageType::RESPONSE_EXCEPTION) {
            let mut decoder = self.decoder(body);
            let message = expect_string(decoder.decode()?)?;
            return Ok(Message::Response(RpcResponse {
                value: Value::Null,
                exception: Some(message),
                attachments: BTreeMap::new(),
            }));
        }
        if package_type.contains(PackageType::HEARTBEAT) {
            return Ok(Message::Heartbeat);
        }
        if package_type.contains(PackageType::REQUEST) {
            return self.unpack_request_body(body).map(Message::Request);
        }
        if package_type.contains(PackageType::RESPONSE) {
            return self.unpack_response_body(body).map(Message::Response);
        }
        Err(Error::IllegalPackage("unrecognized package type"))
    }

    fn unpack_request_body(&self, body: &[u8]) -> Result<RpcRequest> {
        let mut decoder = self.decoder(body);
        let dubbo_version = expect_string(decoder.decode()?)?;
        let path = expect_string(decoder.decode()?)?;
        let version = expect_string(decoder.decode()?)?;
        let method = expect_string(decoder.decode()?)?;
        let descriptor = expect_string(decoder.decode()?)?;
        let arg_count = count_parameters(&descriptor)?;
        let mut args = Vec::with_capacity(arg_count.min(64));
        for _ in 0..arg_count {
            args.push(decoder.decode()?);
        }
        let attachments = attachments_from(decoder.decode()?)?;
        Ok(RpcRequest {
            dubbo_version,
            path,
            version,
            method,
            args,
            attachments,
        })
    }

    fn unpack_response_body(&self, body: &[u8]) -> Result<RpcResponse> {
        let mut decoder = self.decoder(body);
        let marker = match decoder.decode()? {
            Value::Int(v) => v,
            other => {
                return Err(Error::InvalidValue(format!(
                    "response marker is not an int but {}",
                    other.kind()
                )))
            }
        };
        let mut response = RpcResponse {
            value: Value::Null,
            exception: None,
            attachments: BTreeMap::new(),
        };
        match marker {
            tags::RESPONSE_VALUE => response.value = decoder.decode()?,
            tags::RESPONSE_VALUE_WITH_ATTACHMENTS => {
                response.value = decoder.decode()?;
                response.attachments = attachments_from(decoder.decode()?)?;
            }
            tags::RESPONSE_NULL_VALUE => {}
            tags::RESPONSE_NULL_VALUE_WITH_ATTACHMENTS => {
                response.attachments = attachments_from(decoder.decode()?)?;
            }
            tags::RESPONSE_WITH_EXCEPTION => {
                response.exception = Some(expect_string(decoder.decode()?)?);
            }
            tags::RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS => {
                response.exception = Some(expect_string(decoder.decode()?)?);
                response.attachments = attachments_from(decoder.decode()?)?;
            }
            other => {
                return Err(Error::InvalidValue(format!(
                    "unknown response marker {other}"
                )))
            }
        }
        Ok(response)
    }

    /// Best-effort fill of the internal buffer to `n` unconsumed bytes.
    fn fill_to(&mut self, n: usize) -> Result<bool> {
        let mut chunk = [0u8; 4096];
        while self.buf.len() - self.start < n {
            let read = self.reader.read(&mut chunk)?;
            if read == 0 {
                return Ok(false);
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(true)
    }

    fn encoder(&self) -> Encoder {
        match &self.registry {
            Some(registry) => Encoder::with_registry(Arc::clone(registry)),
            None => Encoder::new(),
        }
    }

    fn decoder<'b>(&self, body: &'b [u8]) -> Decoder<'b> {
        match &self.registry {
            Some(registry) => Decoder::with_registry(body, Arc::clone(registry)),
            None => Decoder::new(body),
        }
    }
}

fn serial_byte(header: &DubboHeader) -> u8 {
    match header.serial_id & tags::SERIAL_MASK {
        0 => tags::SERIAL_HESSIAN2,
        serial => serial,
    }
}

fn frame(flags: u8, status: u8, id: i64, body: Vec<u8>) -> Result<Vec<u8>> {
    let body_len = i32::try_from(body.len())
        .map_err(|_| Error::InvalidValue("frame body exceeds int32 length".into()))?;
    let mut out = Vec::with_capacity(tags::HEADER_LENGTH + body.len());
    out.push(tags::MAGIC_HIGH);
    out.push(tags::MAGIC_LOW);
    out.push(flags);
    out.push(status);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&body_len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn request_attachments(service: &Service) -> BTreeMap<String, String> {
    let mut attachments = BTreeMap::new();
    attachments.insert("path".to_owned(), service.path.clone());
    attachments.insert("interface".to_owned(), service.interface.clone());
    attachments.insert("version".to_owned(), service.version.clone());
    if !service.group.is_empty() {
        attachments.insert("group".to_owned(), service.group.clone());
    }
    if !service.timeout.is_zero() {
        attachments.insert(
            "timeout".to_owned(),
            service.timeout.as_millis().to_string(),
        );
    }
    attachments
}

fn attachments_value(attachments: &BTreeMap<String, String>) -> Value {
    Value::map(
        attachments
            .iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect(),
    )
}

fn attachments_from(value: Value) -> Result<BTreeMap<String, String>> {
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Map(cell) => {
            let map = cell.borrow();
            let mut out = BTreeMap::new();
            for (key, value) in &map.entries {
                match (key, value) {
                    (Value::String(k), Value::String(v)) => {
                        out.insert(k.clone(), v.clone());
                    }
                    _ => {
                        return Err(Error::InvalidValue(format!(
                            "attachment entry is {}:{}, not string:string",
                            key.kind(),
                            value.kind()
                        )))
                    }
                }
            }
            Ok(out)
        }
        other => Err(Error::InvalidValue(format!(
            "attachments are not a map but {}",
            other.kind()
        ))),
    }
}

fn expect_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::InvalidValue(format!(
            "expected a string, found {}",
            other.kind()
        ))),
    }
}

/// JVM-style parameter descriptor of one argument, concatenated over all
/// arguments to form the request signature string.
pub fn parameter_descriptor(value: &Value) -> String {
    match value {
        Value::Null => "V".to_owned(),
        Value::Bool(_) => "Z".to_owned(),
        Value::Int(_) => "I".to_owned(),
        Value::Long(_) => "J".to_owned(),
        Value::Double(_) => "D".to_owned(),
        Value::Date(_) => "Ljava/util/Date;".to_owned(),
        Value::String(_) => "Ljava/lang/String;".to_owned(),
        Value::Bytes(_) => "[B".to_owned(),
        Value::List(_) => "Ljava/util/List;".to_owned(),
        Value::Map(_) => "Ljava/util/Map;".to_owned(),
        Value::Object(cell) => {
            let name = cell.borrow().class.name.replace('.', "/");
            format!("L{name};")
        }
    }
}

/// Number of arguments described by a request signature string.
pub fn count_parameters(descriptor: &str) -> Result<usize> {
    let bytes = descriptor.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // array dimension prefix, the element descriptor follows
            b'[' => i += 1,
            b'L' => {
                let end = bytes[i..]
                    .iter()
                    .position(|b| *b == b';')
                    .ok_or_else(|| {
                        Error::InvalidValue(
                            "unterminated class name in parameter descriptor".into(),
                        )
                    })?;
                i += end + 1;
                count += 1;
            }
            b'V' | b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' => {
                i += 1;
                count += 1;
            }
            other => {
                return Err(Error::InvalidValue(format!(
                    "invalid parameter descriptor byte {other:#04x}"
                )))
            }
        }
    }
    Ok(count)
}
