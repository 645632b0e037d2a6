//! Exception packet payload

use tokio::io::{AsyncRead, AsyncWrite};

use super::error::{ProtocolError, ProtocolResult};
use super::wire::{WireReader, WireWriter};

/// Bound on exception nesting accepted from the wire
const MAX_NESTING: usize = 16;

/// Structured error as carried by an Exception packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireException {
    pub code: u64,
    pub name: String,
    pub message: String,
    pub stack: String,
    pub nested: Option<Box<WireException>>,
}

impl WireException {
    /// Flatten a server-side error into its wire form
    pub fn from_error(error: &ProtocolError) -> Self {
        WireException {
            code: error.code(),
            name: error.kind().to_string(),
            message: error.to_string(),
            stack: String::new(),
            nested: None,
        }
    }

    /// Encode the payload (the packet type varuint is written by the caller)
    pub async fn write<W: AsyncWrite + Unpin>(
        &self,
        out: &mut WireWriter<W>,
    ) -> ProtocolResult<()> {
        let mut current = self;
        loop {
            out.write_varuint(current.code).await?;
            out.write_string(&current.name).await?;
            out.write_string(&current.message).await?;
            out.write_string(&current.stack).await?;
            match &current.nested {
                Some(nested) => {
                    out.write_u8(1).await?;
                    current = nested.as_ref();
                }
                None => {
                    out.write_u8(0).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Decode the payload
    pub async fn read<R: AsyncRead + Unpin>(
        input: &mut WireReader<R>,
    ) -> ProtocolResult<WireException> {
        let mut chain = Vec::new();
        loop {
            let code = input.read_varuint().await?;
            let name = input.read_string().await?;
            let message = input.read_string().await?;
            let stack = input.read_string().await?;
            chain.push(WireException {
                code,
                name,
                message,
                stack,
                nested: None,
            });

            let has_nested = input.read_u8().await?;
            if has_nested == 0 {
                break;
            }
            if chain.len() >= MAX_NESTING {
                return Err(ProtocolError::Malformed("exception nesting too deep".into()));
            }
        }

        let mut exception = chain.pop().expect("at least one exception decoded");
        while let Some(mut outer) = chain.pop() {
            outer.nested = Some(Box::new(exception));
            exception = outer;
        }
        Ok(exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;

    async fn roundtrip(exception: &WireException) -> WireException {
        let mut writer = WireWriter::new(Vec::new());
        exception.write(&mut writer).await.unwrap();
        let bytes = writer.into_inner().await.unwrap();
        let mut reader = WireReader::new(bytes.as_slice());
        WireException::read(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_flat_roundtrip() {
        let exception = WireException::from_error(&ProtocolError::UnknownDatabase("web".into()));
        assert_eq!(exception.code, codes::UNKNOWN_DATABASE);
        assert_eq!(roundtrip(&exception).await, exception);
    }

    #[tokio::test]
    async fn test_nested_roundtrip() {
        let exception = WireException {
            code: codes::UPSTREAM,
            name: "UpstreamError".into(),
            message: "stage failed".into(),
            stack: String::new(),
            nested: Some(Box::new(WireException {
                code: codes::CODEC,
                name: "CodecError".into(),
                message: "bad frame".into(),
                stack: String::new(),
                nested: None,
            })),
        };
        assert_eq!(roundtrip(&exception).await, exception);
    }
}
