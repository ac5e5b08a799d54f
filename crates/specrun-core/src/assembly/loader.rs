//! Assembly resolution and loading.
//!
//! Loading is attempted exactly once per run and every failure is
//! classified as an [`AssemblyLoadError`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{AssemblyLoadError, Error, Result};

use super::abi::{ExportedBuffer, MANIFEST_SYMBOL, ManifestFn, ReturnCode};
use super::{AssemblyIdentity, AssemblyManifest, BinaryFormat, LoadedAssembly};

/// Bytes read from the head of a file when sniffing its format.
const HEADER_PROBE_LEN: u64 = 4096;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELF_TYPE_DYN: u16 = 3;

const MACHO_MAGIC_32: u32 = 0xfeed_face;
const MACHO_MAGIC_64: u32 = 0xfeed_facf;
const MACHO_TYPE_DYLIB: u32 = 6;
const MACHO_TYPE_BUNDLE: u32 = 8;

const PE_DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE_FILE_DLL: u16 = 0x2000;

/// The three primitive steps of loading an assembly.
///
/// [`load_context_assembly`] sequences them and classifies failures.
pub trait AssemblyResolver: Send {
    /// Whether anything exists at `location`.
    fn exists(&self, location: &Path) -> bool {
        location.exists()
    }

    /// Read the assembly identity without loading it.
    ///
    /// `Ok(None)` means the file is readable but is not an assembly.
    fn read_identity(&self, location: &Path) -> io::Result<Option<AssemblyIdentity>> {
        read_identity(location)
    }

    /// Load the assembly into the process.
    fn load(&self, identity: &AssemblyIdentity) -> Result<LoadedAssembly>;
}

/// Resolver for native dynamic libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibResolver;

impl AssemblyResolver for DylibResolver {
    fn load(&self, identity: &AssemblyIdentity) -> Result<LoadedAssembly> {
        // Safety: loading runs the library's initialisers; test assemblies are trusted code.
        let library = unsafe { Library::new(&identity.location) }?;
        let manifest = read_manifest(&library)?;

        tracing::debug!(
            "Loaded assembly {} ({} contexts)",
            identity.name,
            manifest.contexts.len()
        );

        Ok(LoadedAssembly::from_library(identity.clone(), manifest, library))
    }
}

/// Call the assembly's manifest export and parse the result.
fn read_manifest(library: &Library) -> Result<AssemblyManifest> {
    // Safety: We trust the symbol exists and has the correct signature
    let func: Symbol<ManifestFn> = unsafe { library.get(MANIFEST_SYMBOL.as_bytes()) }
        .map_err(|e| Error::Manifest(format!("missing export {}: {}", MANIFEST_SYMBOL, e)))?;

    let mut out_ptr: *mut u8 = std::ptr::null_mut();
    let mut out_len: usize = 0;

    let code = unsafe { func(&mut out_ptr, &mut out_len) };
    // Safety: the export hands over a libc::malloc buffer of out_len bytes
    let buffer = unsafe { ExportedBuffer::new(out_ptr, out_len) };

    match ReturnCode::from(code) {
        ReturnCode::Success => AssemblyManifest::from_json(buffer.as_slice()),
        other => Err(Error::Manifest(format!(
            "{} returned {:?} ({})",
            MANIFEST_SYMBOL, other, code
        ))),
    }
}

/// Load the assembly at `location`, classifying every failure.
pub fn load_context_assembly(
    resolver: &dyn AssemblyResolver,
    location: &Path,
) -> std::result::Result<LoadedAssembly, AssemblyLoadError> {
    if !resolver.exists(location) {
        return Err(AssemblyLoadError::FileMissing {
            location: location.to_path_buf(),
        });
    }

    let identity = match resolver.read_identity(location) {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return Err(AssemblyLoadError::NotAnAssembly {
                location: location.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(AssemblyLoadError::UnreadableMetadata {
                location: location.to_path_buf(),
                message: e.to_string(),
            });
        }
    };

    resolver
        .load(&identity)
        .map_err(|e| AssemblyLoadError::LoadFailed {
            location: location.to_path_buf(),
            message: e.to_string(),
        })
}

/// Read the identity of a native assembly from its file header.
///
/// Recognises ELF shared objects, Mach-O dylibs and bundles, and PE DLLs.
/// Executables, relocatable objects and anything else yield `Ok(None)`.
pub fn read_identity(location: &Path) -> io::Result<Option<AssemblyIdentity>> {
    let mut header = Vec::with_capacity(HEADER_PROBE_LEN as usize);
    File::open(location)?
        .take(HEADER_PROBE_LEN)
        .read_to_end(&mut header)?;

    let Some(format) = sniff_format(&header) else {
        return Ok(None);
    };

    let Some(stem) = location.file_stem().and_then(|s| s.to_str()) else {
        return Ok(None);
    };
    let name = match format {
        BinaryFormat::Elf | BinaryFormat::MachO => stem.strip_prefix("lib").unwrap_or(stem),
        BinaryFormat::Pe => stem,
    };

    Ok(Some(AssemblyIdentity {
        name: name.to_string(),
        format,
        location: location.to_path_buf(),
    }))
}

fn sniff_format(header: &[u8]) -> Option<BinaryFormat> {
    if header.starts_with(ELF_MAGIC) {
        return is_elf_shared_object(header).then_some(BinaryFormat::Elf);
    }
    if header.starts_with(PE_DOS_MAGIC) {
        return is_pe_dll(header).then_some(BinaryFormat::Pe);
    }
    if is_macho_library(header) {
        return Some(BinaryFormat::MachO);
    }
    None
}

fn is_elf_shared_object(header: &[u8]) -> bool {
    // e_ident[EI_DATA] at 5, e_type at 16
    let Some(e_type) = read_array::<2>(header, 16) else {
        return false;
    };
    let e_type = match header[5] {
        1 => u16::from_le_bytes(e_type),
        2 => u16::from_be_bytes(e_type),
        _ => return false,
    };
    e_type == ELF_TYPE_DYN
}

fn is_macho_library(header: &[u8]) -> bool {
    let (Some(magic), Some(filetype)) = (read_array::<4>(header, 0), read_array::<4>(header, 12))
    else {
        return false;
    };
    let filetype = match u32::from_le_bytes(magic) {
        MACHO_MAGIC_32 | MACHO_MAGIC_64 => u32::from_le_bytes(filetype),
        _ => match u32::from_be_bytes(magic) {
            MACHO_MAGIC_32 | MACHO_MAGIC_64 => u32::from_be_bytes(filetype),
            _ => return false,
        },
    };
    filetype == MACHO_TYPE_DYLIB || filetype == MACHO_TYPE_BUNDLE
}

fn is_pe_dll(header: &[u8]) -> bool {
    // e_lfanew at 0x3c points at the PE signature; COFF characteristics
    // sit 18 bytes into the file header that follows it.
    let Some(lfanew) = read_array::<4>(header, 0x3c) else {
        return false;
    };
    let pe_offset = u32::from_le_bytes(lfanew) as usize;
    if read_array::<4>(header, pe_offset).as_ref() != Some(PE_SIGNATURE) {
        return false;
    }
    match read_array::<2>(header, pe_offset + 4 + 18) {
        Some(characteristics) => u16::from_le_bytes(characteristics) & PE_FILE_DLL != 0,
        None => false,
    }
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    bytes
        .get(offset..offset.checked_add(N)?)
        .and_then(|slice| slice.try_into().ok())
}
