use crate::ternary::Byte;
use bytesize::ByteSize;
use std::{
    mem::size_of,
    ops::{Index, IndexMut},
};

/// Data space of the abstract machine. Every cell holds a known byte or `Byte::Unknown`.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct AbstractMemory {
    data: Vec<Byte>,
}

impl Index<usize> for AbstractMemory {
    type Output = Byte;
    fn index(&self, index: usize) -> &Self::Output {
        Index::index(&self.data, index)
    }
}

impl IndexMut<usize> for AbstractMemory {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        IndexMut::index_mut(&mut self.data, index)
    }
}

impl AbstractMemory {
    /// Creates a memory of `size` cells, all holding the known value zero.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![Byte::default(); size],
        }
    }

    /// Bounds-checked read, `None` if `address` lies outside the memory.
    pub fn read(&self, address: usize) -> Option<Byte> {
        self.data.get(address).copied()
    }

    /// Bounds-checked write, returns `false` if `address` lies outside the memory.
    pub fn write(&mut self, address: usize, value: Byte) -> bool {
        match self.data.get_mut(address) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Byte> {
        self.data.iter()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn unknown_count(&self) -> usize {
        self.iter().filter(|b| b.is_unknown()).count()
    }

    pub fn allocated(&self) -> ByteSize {
        ByteSize::b((self.data.len() * size_of::<Byte>()) as u64)
    }
}
