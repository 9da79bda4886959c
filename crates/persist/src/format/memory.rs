use super::{FormatReader, FormatWriter};
use crate::error::Result;
use crate::token::{Slot, Token};
use stowage_common::{Scalar, StorableId};

/// In-memory token list usable as both sink and source.
///
/// Writing appends tokens; reading replays them from the start.
#[derive(Debug, Clone, Default)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
    cursor: usize,
    opened: bool,
    closed: bool,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Whether `close` ran since the last `open`.
    pub fn is_closed(&self) -> bool {
        self.opened && self.closed
    }

    fn push(&mut self, token: Token) -> Result<()> {
        self.tokens.push(token);
        Ok(())
    }
}

impl From<Vec<Token>> for TokenBuffer {
    fn from(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }
}

impl FormatWriter for TokenBuffer {
    fn open(&mut self) -> Result<()> {
        self.tokens.clear();
        self.cursor = 0;
        self.opened = true;
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn write_header(&mut self, roots: &[StorableId]) -> Result<()> {
        self.push(Token::Header {
            roots: roots.to_vec(),
        })
    }

    fn write_footer(&mut self, objects: u64) -> Result<()> {
        self.push(Token::Footer { objects })
    }

    fn begin_object(&mut self, slot: &Slot, type_name: &str, id: &StorableId) -> Result<()> {
        self.push(Token::BeginObject {
            slot: slot.clone(),
            type_name: type_name.to_owned(),
            id: id.clone(),
        })
    }

    fn end_object(&mut self) -> Result<()> {
        self.push(Token::EndObject)
    }

    fn write_reference(&mut self, slot: &Slot, id: &StorableId) -> Result<()> {
        self.push(Token::Reference {
            slot: slot.clone(),
            id: id.clone(),
        })
    }

    fn write_scalar(&mut self, slot: &Slot, value: &Scalar) -> Result<()> {
        self.push(Token::Scalar {
            slot: slot.clone(),
            value: value.clone(),
        })
    }

    fn begin_sequence(&mut self, slot: &Slot) -> Result<()> {
        self.push(Token::BeginSequence { slot: slot.clone() })
    }

    fn end_sequence(&mut self) -> Result<()> {
        self.push(Token::EndSequence)
    }

    fn begin_mapping(&mut self, slot: &Slot) -> Result<()> {
        self.push(Token::BeginMapping { slot: slot.clone() })
    }

    fn end_mapping(&mut self) -> Result<()> {
        self.push(Token::EndMapping)
    }

    fn write_token(&mut self, token: &Token) -> Result<()> {
        self.push(token.clone())
    }
}

impl FormatReader for TokenBuffer {
    fn open(&mut self) -> Result<()> {
        self.cursor = 0;
        self.opened = true;
        self.closed = false;
        Ok(())
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        Ok(token)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
