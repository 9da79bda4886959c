//! Binary adapter: each token is one CBOR item, and the whole stream sits in
//! a single zstd frame.

use super::{FormatReader, FormatWriter};
use crate::error::{PersistError, Result};
use crate::token::{Slot, Token};
use std::io::{BufReader, Read, Write};
use stowage_common::{Scalar, StorableId};

enum Sink<W: Write> {
    Idle(W),
    Open(zstd::Encoder<'static, W>),
    /// The inner writer was lost to a failed open or finish.
    Gone,
}

/// Streaming CBOR+zstd writer.
pub struct BinaryWriter<W: Write> {
    sink: Sink<W>,
    level: i32,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W, level: i32) -> Self {
        Self {
            sink: Sink::Idle(inner),
            level,
        }
    }

    /// The inner writer, once the stream has been closed.
    pub fn into_inner(self) -> Option<W> {
        match self.sink {
            Sink::Idle(inner) => Some(inner),
            Sink::Open(_) | Sink::Gone => None,
        }
    }

    fn emit(&mut self, token: Token) -> Result<()> {
        let Sink::Open(encoder) = &mut self.sink else {
            return Err(PersistError::malformed("binary sink is not open"));
        };
        ciborium::into_writer(&token, encoder).map_err(|e| PersistError::CborEncode(e.to_string()))
    }
}

impl<W: Write> FormatWriter for BinaryWriter<W> {
    fn open(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.sink, Sink::Gone) {
            Sink::Idle(inner) => {
                self.sink = Sink::Open(zstd::Encoder::new(inner, self.level)?);
                Ok(())
            }
            open @ Sink::Open(_) => {
                self.sink = open;
                Err(PersistError::malformed("binary sink opened twice"))
            }
            Sink::Gone => Err(PersistError::malformed("binary sink is gone")),
        }
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.sink, Sink::Gone) {
            Sink::Open(encoder) => {
                let mut inner = encoder.finish()?;
                inner.flush()?;
                self.sink = Sink::Idle(inner);
                Ok(())
            }
            other => {
                self.sink = other;
                Ok(())
            }
        }
    }

    fn write_header(&mut self, roots: &[StorableId]) -> Result<()> {
        self.emit(Token::Header {
            roots: roots.to_vec(),
        })
    }

    fn write_footer(&mut self, objects: u64) -> Result<()> {
        self.emit(Token::Footer { objects })
    }

    fn begin_object(&mut self, slot: &Slot, type_name: &str, id: &StorableId) -> Result<()> {
        self.emit(Token::BeginObject {
            slot: slot.clone(),
            type_name: type_name.to_owned(),
            id: id.clone(),
        })
    }

    fn end_object(&mut self) -> Result<()> {
        self.emit(Token::EndObject)
    }

    fn write_reference(&mut self, slot: &Slot, id: &StorableId) -> Result<()> {
        self.emit(Token::Reference {
            slot: slot.clone(),
            id: id.clone(),
        })
    }

    fn write_scalar(&mut self, slot: &Slot, value: &Scalar) -> Result<()> {
        self.emit(Token::Scalar {
            slot: slot.clone(),
            value: value.clone(),
        })
    }

    fn begin_sequence(&mut self, slot: &Slot) -> Result<()> {
        self.emit(Token::BeginSequence { slot: slot.clone() })
    }

    fn end_sequence(&mut self) -> Result<()> {
        self.emit(Token::EndSequence)
    }

    fn begin_mapping(&mut self, slot: &Slot) -> Result<()> {
        self.emit(Token::BeginMapping { slot: slot.clone() })
    }

    fn end_mapping(&mut self) -> Result<()> {
        self.emit(Token::EndMapping)
    }

    fn write_token(&mut self, token: &Token) -> Result<()> {
        self.emit(token.clone())
    }
}

enum Source<R: Read> {
    Idle(R),
    Open(zstd::Decoder<'static, BufReader<R>>),
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Tokens,
    /// Footer returned; the payload must end here.
    AfterFooter,
    Done,
}

/// CBOR+zstd reader. Decodes one token per call and stops after the footer.
/// Decompressed bytes left after the footer are an error.
pub struct BinaryReader<R: Read> {
    source: Source<R>,
    phase: Phase,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            source: Source::Idle(inner),
            phase: Phase::Tokens,
        }
    }
}

impl<R: Read> FormatReader for BinaryReader<R> {
    fn open(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.source, Source::Gone) {
            Source::Idle(inner) => {
                self.source = Source::Open(zstd::Decoder::new(inner)?);
                self.phase = Phase::Tokens;
                Ok(())
            }
            open @ Source::Open(_) => {
                self.source = open;
                Err(PersistError::malformed("binary source opened twice"))
            }
            Source::Gone => Err(PersistError::malformed("binary source is gone")),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        if self.phase == Phase::Done {
            return Ok(None);
        }
        let Source::Open(decoder) = &mut self.source else {
            return Err(PersistError::malformed("binary source is not open"));
        };
        if self.phase == Phase::AfterFooter {
            self.phase = Phase::Done;
            let mut byte = [0u8; 1];
            if decoder.read(&mut byte)? != 0 {
                return Err(PersistError::malformed("trailing data after the footer"));
            }
            return Ok(None);
        }
        let token: Token =
            ciborium::from_reader(decoder).map_err(|e| PersistError::CborDecode(e.to_string()))?;
        if matches!(token, Token::Footer { .. }) {
            self.phase = Phase::AfterFooter;
        }
        Ok(Some(token))
    }

    fn close(&mut self) -> Result<()> {
        if let Source::Open(decoder) = std::mem::replace(&mut self.source, Source::Gone) {
            self.source = Source::Idle(decoder.finish().into_inner());
        }
        Ok(())
    }
}
