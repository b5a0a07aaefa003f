//! Host-side byte storage with vector-friendly alignment.

use bytemuck::{Pod, Zeroable};

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Chunk([u8; 16]);

/// Zero-initialized byte region aligned to 16 bytes, so mapped views can be
/// reinterpreted as any `glam` vector type.
#[derive(Debug, Clone)]
pub struct AlignedBytes {
    chunks: Vec<Chunk>,
    len: usize,
}

impl AlignedBytes {
    /// Zeroed region of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            chunks: vec![Chunk::zeroed(); len.div_ceil(16)],
            len,
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only view.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.chunks)[..self.len]
    }

    /// Mutable view. The address is stable for the lifetime of `self`.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.chunks)[..self.len]
    }

    /// Copy `data` in at `offset`. Returns `false` if it does not fit.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> bool {
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        if end > self.len {
            return false;
        }
        self.as_bytes_mut()[offset..end].copy_from_slice(data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_are_sixteen_byte_aligned() {
        let mut bytes = AlignedBytes::zeroed(40);
        assert_eq!(bytes.len(), 40);
        assert_eq!(bytes.as_bytes_mut().as_ptr() as usize % 16, 0);
        let floats: &mut [glam::Vec4] = bytemuck::cast_slice_mut(&mut bytes.as_bytes_mut()[..32]);
        assert_eq!(floats.len(), 2);
    }

    #[test]
    fn write_rejects_overflow() {
        let mut bytes = AlignedBytes::zeroed(8);
        assert!(bytes.write(4, &[1, 2, 3, 4]));
        assert!(!bytes.write(6, &[1, 2, 3]));
        assert_eq!(bytes.as_bytes(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }
}
