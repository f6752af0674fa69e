//! Award BIOS module extraction.
//!
//! An Award BIOS image is a concatenation of LZH archive members ("modules") plus some
//! uncompressed code.  This crate finds the modules, cuts each one out into a standalone `.lzh`
//! archive, has an external archiver decompress it, and repeats the process on any module that
//! contains modules of its own.

pub mod archiver;
pub mod batch;
pub mod extract;
pub mod header;
pub mod signature;
pub mod tag;
pub mod util;
