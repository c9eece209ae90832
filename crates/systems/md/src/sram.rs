//! Battery-backed cartridge RAM.

use crate::header::SramDecl;
use emu_core::EngineError;

#[derive(Debug, Clone)]
pub struct BatteryRam {
    data: Vec<u8>,
}

impl BatteryRam {
    /// Zero-filled RAM sized from the header declaration.
    pub fn new(decl: SramDecl) -> Self {
        Self {
            data: vec![0; decl.size()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Replace the contents. The length must match exactly.
    pub fn load(&mut self, data: &[u8]) -> Result<(), EngineError> {
        if data.len() != self.data.len() {
            return Err(EngineError::SizeMismatch {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// Write `bytes` starting at `offset`, wrapping at the end of RAM.
    pub fn write_wrapping(&mut self, offset: usize, bytes: &[u8]) {
        let len = self.data.len();
        if len == 0 {
            return;
        }
        for (i, &b) in bytes.iter().enumerate() {
            self.data[(offset + i) % len] = b;
        }
    }
}
