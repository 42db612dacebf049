//! Loading the native conversion library
//!
//! [`NativeLibrary`] resolves the exported conversion routine with
//! `libloading` and pairs it with the deallocator that matches the library's
//! allocator. The loaded library is kept alive for as long as the provider
//! exists, so the resolved function pointers never dangle.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use libloading::Library;

use crate::error::GatewayError;
use crate::ffi::{ConvertFn, DEFAULT_CONVERT_SYMBOL, DEFAULT_LIBRARY_NAME, ReleaseFn, SizeFn};
use crate::provider::ConversionProvider;

/// How buffers returned by the library are released
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deallocator {
    /// `kernel32!LocalFree`, matching `LocalAlloc` in the reference build
    LocalFree,
    /// The C runtime `free`
    CFree,
    /// A release routine exported by the conversion library itself, with an
    /// optional exported size query (`malloc_usable_size` shape)
    Exported {
        free: String,
        size: Option<String>,
    },
}

impl Deallocator {
    /// Exported release routine without a size query
    pub fn exported(free: impl Into<String>) -> Self {
        Deallocator::Exported {
            free: free.into(),
            size: None,
        }
    }
}

impl Default for Deallocator {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Deallocator::LocalFree
        } else {
            Deallocator::CFree
        }
    }
}

impl FromStr for Deallocator {
    type Err = String;

    /// Parses `local`, `c` or `export:<free>[,<size>]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Deallocator::LocalFree),
            "c" | "free" => Ok(Deallocator::CFree),
            other => {
                let symbols = other.strip_prefix("export:").ok_or_else(|| {
                    format!(
                        "unknown deallocator '{other}' (expected local, c or export:<free>[,<size>])"
                    )
                })?;
                let (free, size) = match symbols.split_once(',') {
                    Some((free, size)) => (free, Some(size)),
                    None => (symbols, None),
                };
                if free.is_empty() || size.is_some_and(str::is_empty) {
                    return Err(format!("empty symbol name in '{other}'"));
                }
                Ok(Deallocator::Exported {
                    free: free.to_owned(),
                    size: size.map(str::to_owned),
                })
            }
        }
    }
}

impl fmt::Display for Deallocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deallocator::LocalFree => write!(f, "local"),
            Deallocator::CFree => write!(f, "c"),
            Deallocator::Exported { free, size: None } => write!(f, "export:{free}"),
            Deallocator::Exported {
                free,
                size: Some(size),
            } => write!(f, "export:{free},{size}"),
        }
    }
}

/// Where to find the native library and which routines to bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Path or platform name of the dynamic library
    pub path: PathBuf,
    /// Exported name of the conversion routine
    pub symbol: String,
    /// Release routine for output buffers
    pub deallocator: Deallocator,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LIBRARY_NAME),
            symbol: DEFAULT_CONVERT_SYMBOL.to_owned(),
            deallocator: Deallocator::default(),
        }
    }
}

enum Release {
    C {
        free: ReleaseFn,
        size: Option<SizeFn>,
    },
    #[cfg(target_os = "windows")]
    Local {
        free: crate::ffi::LocalFreeFn,
        size: crate::ffi::LocalSizeFn,
    },
}

/// A [`ConversionProvider`] backed by native code
pub struct NativeLibrary {
    label: String,
    convert: ConvertFn,
    release: Release,
    // Dropped after the function pointers above stop being used.
    _libraries: Vec<Library>,
}

impl NativeLibrary {
    /// Load the library described by `config` and resolve its routines
    ///
    /// # Errors
    ///
    /// `GatewayError::Library` if the library, the conversion symbol or the
    /// deallocator cannot be resolved on this platform.
    pub fn open(config: &LibraryConfig) -> Result<Self, GatewayError> {
        log::debug!(
            "loading {} (symbol {}, deallocator {})",
            config.path.display(),
            config.symbol,
            config.deallocator
        );

        // SAFETY: loading runs the library's initialisers; the caller chose
        // this library and accepts that.
        let library = unsafe { Library::new(&config.path) }.map_err(|e| {
            GatewayError::Library(format!("cannot load {}: {e}", config.path.display()))
        })?;

        // SAFETY: the symbol is declared with the documented ABI in `ffi`.
        let convert: ConvertFn = unsafe {
            *library
                .get::<ConvertFn>(config.symbol.as_bytes())
                .map_err(|e| GatewayError::Library(format!("symbol {}: {e}", config.symbol)))?
        };

        let mut libraries = Vec::with_capacity(2);
        let release = match &config.deallocator {
            Deallocator::CFree => c_release(),
            Deallocator::Exported { free, size } => {
                // SAFETY: an exported release routine takes the pointer it
                // handed out, matching `ReleaseFn`.
                let free: ReleaseFn = unsafe {
                    *library
                        .get::<ReleaseFn>(free.as_bytes())
                        .map_err(|e| GatewayError::Library(format!("symbol {free}: {e}")))?
                };
                let size: Option<SizeFn> = match size {
                    // SAFETY: an exported size query takes a live pointer and
                    // returns its usable size, matching `SizeFn`.
                    Some(symbol) => Some(unsafe {
                        *library
                            .get::<SizeFn>(symbol.as_bytes())
                            .map_err(|e| GatewayError::Library(format!("symbol {symbol}: {e}")))?
                    }),
                    None => None,
                };
                Release::C { free, size }
            }
            Deallocator::LocalFree => {
                let (release, kernel32) = local_release()?;
                libraries.push(kernel32);
                release
            }
        };
        libraries.push(library);

        if matches!(release, Release::C { size: None, .. }) {
            log::warn!(
                "deallocator {} has no allocation size query; output lengths cannot be verified",
                config.deallocator
            );
        }

        Ok(Self {
            label: config.path.display().to_string(),
            convert,
            release,
            _libraries: libraries,
        })
    }

    /// Bind routines that are already linked into the process
    ///
    /// # Safety
    ///
    /// `release` must free exactly the allocations that `convert` hands out,
    /// and `size`, when given, must report their usable size.
    pub unsafe fn from_fns(
        label: impl Into<String>,
        convert: ConvertFn,
        release: ReleaseFn,
        size: Option<SizeFn>,
    ) -> Self {
        Self {
            label: label.into(),
            convert,
            release: Release::C {
                free: release,
                size,
            },
            _libraries: Vec::new(),
        }
    }
}

fn c_release() -> Release {
    Release::C {
        free: libc::free,
        size: c_usable_size(),
    }
}

#[cfg(all(target_os = "linux", any(target_env = "gnu", target_env = "musl")))]
fn c_usable_size() -> Option<SizeFn> {
    use std::ffi::c_void;

    unsafe extern "C" fn usable_size(ptr: *const c_void) -> usize {
        // SAFETY: caller passes a live pointer from the C allocator.
        unsafe { libc::malloc_usable_size(ptr as *mut c_void) }
    }
    Some(usable_size)
}

#[cfg(any(
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
fn c_usable_size() -> Option<SizeFn> {
    Some(libc::malloc_usable_size as SizeFn)
}

#[cfg(target_vendor = "apple")]
fn c_usable_size() -> Option<SizeFn> {
    Some(libc::malloc_size as SizeFn)
}

#[cfg(not(any(
    all(target_os = "linux", any(target_env = "gnu", target_env = "musl")),
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_vendor = "apple"
)))]
fn c_usable_size() -> Option<SizeFn> {
    None
}

#[cfg(target_os = "windows")]
fn local_release() -> Result<(Release, Library), GatewayError> {
    use crate::ffi::{LOCAL_FREE_SYMBOL, LOCAL_SIZE_SYMBOL, LocalFreeFn, LocalSizeFn};

    // SAFETY: kernel32 is always mapped into Windows processes.
    let kernel32 = unsafe { Library::new("kernel32.dll") }?;
    // SAFETY: signatures match the Win32 declarations in `ffi`.
    let (free, size) = unsafe {
        (
            *kernel32.get::<LocalFreeFn>(LOCAL_FREE_SYMBOL.as_bytes())?,
            *kernel32.get::<LocalSizeFn>(LOCAL_SIZE_SYMBOL.as_bytes())?,
        )
    };
    Ok((Release::Local { free, size }, kernel32))
}

#[cfg(not(target_os = "windows"))]
fn local_release() -> Result<(Release, Library), GatewayError> {
    Err(GatewayError::Library(
        "LocalFree is only available on Windows".to_owned(),
    ))
}

impl ConversionProvider for NativeLibrary {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        // SAFETY: the gateway upholds the pointer contract of `ConvertFn`.
        unsafe { (self.convert)(input, input_len, output, output_len) }
    }

    unsafe fn release(&self, buffer: *mut u8) {
        match self.release {
            // SAFETY: `buffer` came from `convert`, which allocates with the
            // allocator `free` belongs to.
            Release::C { free, .. } => unsafe { free(buffer.cast()) },
            #[cfg(target_os = "windows")]
            Release::Local { free, .. } => {
                // SAFETY: as above, for `LocalAlloc`.
                let leftover = unsafe { free(buffer.cast()) };
                if !leftover.is_null() {
                    log::warn!("LocalFree failed for {:p}", buffer);
                }
            }
        }
    }

    unsafe fn allocation_size(&self, buffer: *const u8) -> Option<usize> {
        match self.release {
            // SAFETY: `buffer` is live and owned by the matching allocator.
            Release::C { size, .. } => size.map(|size| unsafe { size(buffer.cast()) }),
            #[cfg(target_os = "windows")]
            Release::Local { size, .. } => {
                // SAFETY: as above. LocalSize reports 0 on failure.
                let bytes = unsafe { size(buffer.cast_mut().cast()) };
                (bytes != 0).then_some(bytes)
            }
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deallocator_parsing() {
        assert_eq!("local".parse(), Ok(Deallocator::LocalFree));
        assert_eq!("c".parse(), Ok(Deallocator::CFree));
        assert_eq!("free".parse(), Ok(Deallocator::CFree));
        assert_eq!(
            "export:mobi_buffer_free".parse(),
            Ok(Deallocator::exported("mobi_buffer_free"))
        );
        assert_eq!(
            "export:mobi_buffer_free,mobi_buffer_size".parse(),
            Ok(Deallocator::Exported {
                free: "mobi_buffer_free".to_owned(),
                size: Some("mobi_buffer_size".to_owned()),
            })
        );
        assert!("export:".parse::<Deallocator>().is_err());
        assert!("export:,size".parse::<Deallocator>().is_err());
        assert!("export:free,".parse::<Deallocator>().is_err());
        assert!("heap".parse::<Deallocator>().is_err());
    }

    #[test]
    fn test_deallocator_display_round_trips() {
        for dealloc in [
            Deallocator::LocalFree,
            Deallocator::CFree,
            Deallocator::exported("release"),
            Deallocator::Exported {
                free: "release".to_owned(),
                size: Some("usable".to_owned()),
            },
        ] {
            assert_eq!(dealloc.to_string().parse::<Deallocator>(), Ok(dealloc));
        }
    }

    #[test]
    fn test_default_config_uses_reference_symbol() {
        let config = LibraryConfig::default();
        assert_eq!(config.symbol, "ConvertMobiToEpub");
        assert_eq!(config.path, PathBuf::from(DEFAULT_LIBRARY_NAME));
    }

    #[test]
    fn test_missing_library_is_reported() {
        let config = LibraryConfig {
            path: PathBuf::from("/nonexistent/dir/libmobiconvert-missing.so"),
            ..LibraryConfig::default()
        };
        match NativeLibrary::open(&config) {
            Err(GatewayError::Library(msg)) => assert!(msg.contains("libmobiconvert-missing")),
            other => panic!("expected Library error, got {other:?}"),
        }
    }

    #[cfg(any(
        all(target_os = "linux", any(target_env = "gnu", target_env = "musl")),
        target_vendor = "apple"
    ))]
    #[test]
    fn test_c_allocator_reports_usable_size() {
        let size = c_usable_size().expect("size query available on this platform");
        // SAFETY: pointer comes from malloc and is freed below.
        unsafe {
            let ptr = libc::malloc(24);
            assert!(!ptr.is_null());
            assert!(size(ptr.cast_const()) >= 24);
            libc::free(ptr);
        }
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_local_free_unavailable_off_windows() {
        assert!(matches!(local_release(), Err(GatewayError::Library(_))));
    }
}
