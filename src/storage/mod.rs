pub mod sstable;

pub use sstable::{Sstable, SstableWriter};
