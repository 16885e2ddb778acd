use memmap2::{Mmap, MmapMut};

use crate::error::CompileError;

/// The signature of generated code. Arguments, in order: the input as
/// code points, its length, the frame stack, the frame stack's capacity in
/// words and the visit bitmap.
pub type Entry = unsafe extern "sysv64" fn(*const u32, usize, *mut u64, usize, *mut u64) -> u64;

/// An executable, read-only mapping holding generated code.
#[derive(Debug)]
pub struct CodeBuffer {
    map: Mmap,
}

impl CodeBuffer {
    pub fn new(code: &[u8]) -> Result<Self, CompileError> {
        let mut map = MmapMut::map_anon(code.len().max(1))
            .map_err(|err| CompileError::CodeBuffer(err.to_string()))?;
        map[..code.len()].copy_from_slice(code);

        let map = map
            .make_exec()
            .map_err(|err| CompileError::CodeBuffer(err.to_string()))?;

        Ok(Self { map })
    }

    pub fn entry(&self) -> Entry {
        // SAFETY: the mapping is executable and lives as long as self. It
        // holds code generated for exactly this signature.
        unsafe { std::mem::transmute::<*const u8, Entry>(self.map.as_ptr()) }
    }
}
