//! Addressable memory blocks.
//!
//! A [`MemoryBlock`] is a zero-initialized byte buffer that is given a
//! numeric address when it is created.  The address stays valid for as long
//! as any handle to the block lives and can be turned back into the block
//! with [`MemoryBlock::resolve`], which is how pointer fields are followed.
//! Addresses are never reused within a thread, so a stale address fails to
//! resolve instead of aliasing a newer block.
//!
//! Every read and write is bounds-checked against the block.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{TesseraError, TesseraResult};

/// First address handed out.
pub const BASE_ADDRESS: u64 = 0x1_0000;

/// Alignment of every block address.
pub const BLOCK_ALIGN: u64 = 16;

/// Size in bytes of a stored address.
pub const POINTER_SIZE: usize = 8;

struct AddressSpace {
    next: u64,
    blocks: BTreeMap<u64, Weak<BlockInner>>,
}

thread_local! {
    static ADDRESS_SPACE: RefCell<AddressSpace> = const {
        RefCell::new(AddressSpace { next: BASE_ADDRESS, blocks: BTreeMap::new() })
    };
}

struct BlockInner {
    address: u64,
    bytes: RefCell<Box<[u8]>>,
}

impl Drop for BlockInner {
    fn drop(&mut self) {
        let address = self.address;
        // The address space may already be gone during thread teardown.
        let _ = ADDRESS_SPACE.try_with(|space| {
            space.borrow_mut().blocks.remove(&address);
        });
        trace!(address, "memory block freed");
    }
}

/// A shared, addressable, zero-initialized byte buffer.
#[derive(Clone)]
pub struct MemoryBlock {
    inner: Rc<BlockInner>,
}

impl MemoryBlock {
    /// Allocates `len` zeroed bytes and assigns them an address.
    pub fn zeroed(len: usize) -> TesseraResult<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| TesseraError::OutOfMemory)?;
        bytes.resize(len, 0);
        Ok(Self::register(bytes.into_boxed_slice()))
    }

    /// Allocates a block holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> TesseraResult<Self> {
        let block = Self::zeroed(data.len())?;
        block.write(0, data)?;
        Ok(block)
    }

    fn register(bytes: Box<[u8]>) -> Self {
        let len = bytes.len() as u64;
        ADDRESS_SPACE.with(|space| {
            let mut space = space.borrow_mut();
            let address = space.next;
            let span = len.max(1).div_ceil(BLOCK_ALIGN) * BLOCK_ALIGN;
            // Leave a gap so one-past-the-end never names the next block.
            space.next = address + span + BLOCK_ALIGN;
            let inner = Rc::new(BlockInner {
                address,
                bytes: RefCell::new(bytes),
            });
            space.blocks.insert(address, Rc::downgrade(&inner));
            trace!(address, len, "memory block allocated");
            Self { inner }
        })
    }

    /// Finds the live block containing `address` and the offset within it.
    pub fn resolve(address: u64) -> TesseraResult<(Self, usize)> {
        ADDRESS_SPACE.with(|space| {
            let space = space.borrow();
            let (&start, weak) = space
                .blocks
                .range(..=address)
                .next_back()
                .ok_or(TesseraError::InvalidAddress(address))?;
            let inner = weak.upgrade().ok_or(TesseraError::InvalidAddress(address))?;
            let offset = (address - start) as usize;
            if offset > inner.bytes.borrow().len() {
                return Err(TesseraError::InvalidAddress(address));
            }
            Ok((Self { inner }, offset))
        })
    }

    /// The block's address.
    #[inline]
    pub fn address(&self) -> u64 {
        self.inner.address
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.inner.bytes.borrow().len()
    }

    /// Returns `true` for a zero-length block.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if both handles refer to the same block.
    pub fn ptr_eq(&self, other: &MemoryBlock) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn check(&self, offset: usize, size: usize) -> TesseraResult<()> {
        let len = self.len();
        match offset.checked_add(size) {
            Some(end) if end <= len => Ok(()),
            _ => Err(TesseraError::OutOfBounds { offset, len, size }),
        }
    }

    /// Copies `out.len()` bytes starting at `offset` into `out`.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> TesseraResult<()> {
        self.check(offset, out.len())?;
        out.copy_from_slice(&self.inner.bytes.borrow()[offset..offset + out.len()]);
        Ok(())
    }

    /// Copies `data` into the block starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> TesseraResult<()> {
        self.check(offset, data.len())?;
        self.inner.bytes.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Returns a copy of `size` bytes starting at `offset`.
    pub fn read_vec(&self, offset: usize, size: usize) -> TesseraResult<Vec<u8>> {
        let mut out = vec![0; size];
        self.read(offset, &mut out)?;
        Ok(out)
    }

    /// Fills `size` bytes starting at `offset` with zero.
    pub fn zero(&self, offset: usize, size: usize) -> TesseraResult<()> {
        self.fill(offset, size, 0)
    }

    /// Fills `size` bytes starting at `offset` with `byte`.
    pub fn fill(&self, offset: usize, size: usize, byte: u8) -> TesseraResult<()> {
        self.check(offset, size)?;
        self.inner.bytes.borrow_mut()[offset..offset + size].fill(byte);
        Ok(())
    }

    /// Reads a stored address at `offset`.
    pub fn read_address(&self, offset: usize) -> TesseraResult<u64> {
        let mut raw = [0; POINTER_SIZE];
        self.read(offset, &mut raw)?;
        Ok(u64::from_ne_bytes(raw))
    }

    /// Stores `address` at `offset`.
    pub fn write_address(&self, offset: usize, address: u64) -> TesseraResult<()> {
        self.write(offset, &address.to_ne_bytes())
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_block_reads_zero() {
        let block = MemoryBlock::zeroed(8).unwrap();
        assert_eq!(block.read_vec(0, 8).unwrap(), vec![0; 8]);
        assert!(block.address() >= BASE_ADDRESS);
        assert_eq!(block.address() % BLOCK_ALIGN, 0);
    }

    #[test]
    fn test_write_then_read() {
        let block = MemoryBlock::zeroed(16).unwrap();
        block.write(4, &[1, 2, 3]).unwrap();
        assert_eq!(block.read_vec(3, 5).unwrap(), vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_out_of_bounds_access_fails() {
        let block = MemoryBlock::zeroed(4).unwrap();
        assert_eq!(
            block.write(2, &[0; 4]),
            Err(TesseraError::OutOfBounds { offset: 2, len: 4, size: 4 })
        );
        assert!(block.read_vec(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_resolve_interior_address() {
        let block = MemoryBlock::zeroed(32).unwrap();
        let (found, offset) = MemoryBlock::resolve(block.address() + 10).unwrap();
        assert!(found.ptr_eq(&block));
        assert_eq!(offset, 10);
    }

    #[test]
    fn test_resolve_rejects_unknown_and_freed() {
        assert_eq!(MemoryBlock::resolve(0).unwrap_err(), TesseraError::InvalidAddress(0));
        let block = MemoryBlock::zeroed(8).unwrap();
        let address = block.address();
        drop(block);
        assert!(MemoryBlock::resolve(address).is_err());
    }

    #[test]
    fn test_blocks_do_not_overlap() {
        let a = MemoryBlock::zeroed(20).unwrap();
        let b = MemoryBlock::zeroed(20).unwrap();
        assert!(b.address() >= a.address() + 20);
        let (found, _) = MemoryBlock::resolve(a.address() + 20).unwrap();
        assert!(found.ptr_eq(&a));
    }

    #[test]
    fn test_address_round_trip() {
        let block = MemoryBlock::zeroed(16).unwrap();
        block.write_address(8, 0xdead_beef).unwrap();
        assert_eq!(block.read_address(8).unwrap(), 0xdead_beef);
    }
}
