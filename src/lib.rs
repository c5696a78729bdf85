#![forbid(unsafe_code)]
pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod registry;
pub mod tags;
pub mod value;


pub use codec::{
    Body, DubboHeader, HessianCodec, Message, PackageType, ResponseStatus,
    RpcRequest, RpcResponse, Service,
};
pub use decode::Decoder;
pub use encode::Encoder;
pub use error::{Error, Result};
pub use registry::TypeRegistry;
pub use value::{ClassDef, List, ListRef, Map, MapRef, Object, ObjectRef, Value};
