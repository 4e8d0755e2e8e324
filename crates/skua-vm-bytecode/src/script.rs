//! Compiled script container and its serialized form

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::block::ByteCodeBlock;
use crate::error::{BytecodeError, Result};
use crate::{BYTECODE_MAGIC, BYTECODE_VERSION};

const HEADER_LEN: usize = 16;

/// A compiled script: every function block plus the entry block index
///
/// Immutable once built. Runtimes share it through `Arc<Script>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Source URL/path used in stack traces
    pub source_name: String,
    /// All function blocks; children reference each other by index
    pub functions: Vec<ByteCodeBlock>,
    /// Index of the top-level block
    pub entry: u32,
    /// Compiled as eval code
    pub is_eval: bool,
}

impl Script {
    /// Create a script from its blocks
    pub fn new(source_name: impl Into<String>, functions: Vec<ByteCodeBlock>, entry: u32) -> Self {
        Self {
            source_name: source_name.into(),
            functions,
            entry,
            is_eval: false,
        }
    }

    /// Get the entry block
    pub fn entry_block(&self) -> Option<&ByteCodeBlock> {
        self.functions.get(self.entry as usize)
    }

    /// Get a block by index
    pub fn function(&self, index: u32) -> Option<&ByteCodeBlock> {
        self.functions.get(index as usize)
    }

    /// Listing of every block, entry first
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Some(entry) = self.entry_block() {
            out.push_str(&entry.dump());
        }
        for (i, block) in self.functions.iter().enumerate() {
            if i as u32 != self.entry {
                out.push('\n');
                out.push_str(&block.dump());
            }
        }
        out
    }

    /// Serialize script to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data = serde_json::to_vec(self)?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + data.len());
        bytes.extend_from_slice(&BYTECODE_MAGIC);
        bytes.extend_from_slice(&BYTECODE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Deserialize script from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(BytecodeError::UnexpectedEnd);
        }
        if bytes[0..8] != BYTECODE_MAGIC {
            return Err(BytecodeError::InvalidMagic);
        }

        let version = read_u32(&bytes[8..12]);
        if version != BYTECODE_VERSION {
            return Err(BytecodeError::UnsupportedVersion(version));
        }

        let data_len = read_u32(&bytes[12..16]) as usize;
        if bytes.len() < HEADER_LEN + data_len {
            return Err(BytecodeError::UnexpectedEnd);
        }

        Ok(serde_json::from_slice(&bytes[HEADER_LEN..HEADER_LEN + data_len])?)
    }

    /// Write script to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Read script from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::operand::Register;

    fn sample() -> Script {
        let mut main = ByteCodeBlock::new(None);
        main.constants.add_string("hello");
        main.required_operand_register_number = 1;
        main.stack_allocated_variable_size = 1;
        main.required_total_register_number = 2;
        main.instructions.push(Instruction::LoadTrue { dst: Register(0) });
        main.instructions.push(Instruction::Return { src: Register(0) });
        Script::new("test.js", vec![main], 0)
    }

    #[test]
    fn test_script_roundtrip() {
        let script = sample();
        let bytes = script.to_bytes().unwrap();
        let restored = Script::from_bytes(&bytes).unwrap();

        assert_eq!(restored.source_name, "test.js");
        assert_eq!(restored.functions.len(), 1);
        let entry = restored.entry_block().unwrap();
        assert_eq!(entry.constants.get_str(0), Some("hello"));
        assert_eq!(entry.instructions, script.functions[0].instructions);
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = b"INVALID\0........";
        let result = Script::from_bytes(bytes);
        assert!(matches!(result, Err(BytecodeError::InvalidMagic)));
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Script::from_bytes(&bytes),
            Err(BytecodeError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            Script::from_bytes(&bytes),
            Err(BytecodeError::UnsupportedVersion(99))
        ));
    }
}
