//! Loading a SELF module end to end.

use std::fs::File;
use std::path::Path;

use crate::error::LoadError;
use crate::header::Headers;
use crate::mapper::MappedImage;
use crate::module_info::{ImportDescriptor, ModuleInfo};

/// Knobs for [`SelfLibrary::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Check the ELF magic, class and data encoding before trusting the header.
    pub verify_ident: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { verify_ident: true }
    }
}

/// A mapped SELF module with its import table fully walked.
#[derive(Debug)]
pub struct SelfLibrary {
    headers: Headers,
    image: MappedImage,
    module_info: ModuleInfo,
    imports: Vec<ImportDescriptor>,
}

impl SelfLibrary {
    /// Open `path`, map it, and enumerate its imports.
    ///
    /// Either every step succeeds or nothing stays mapped.
    ///
    /// # Errors
    ///
    /// Returns the first [`LoadError`] hit by any step.
    pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        log::debug!("loading {}", path.display());
        Self::from_file(&mut file, options)
    }

    /// Load from an already opened file.
    ///
    /// # Errors
    ///
    /// Returns the first [`LoadError`] hit by any step.
    pub fn from_file(file: &mut File, options: &LoadOptions) -> Result<Self, LoadError> {
        let headers = Headers::read(file, options)?;
        let image = MappedImage::map(&headers, file)?;
        let module_info = ModuleInfo::read(&image, headers.header.e_entry)?;
        log::info!("library name: {}", module_info.name);

        let imports = module_info
            .imports(&image)
            .inspect(|import| {
                if let Ok(import) = import {
                    log::info!("import name: {}", import.module_name);
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers,
            image,
            module_info,
            imports,
        })
    }

    /// The file header and program headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The mapped image.
    #[must_use]
    pub fn image(&self) -> &MappedImage {
        &self.image
    }

    /// The module-info record.
    #[must_use]
    pub fn module_info(&self) -> &ModuleInfo {
        &self.module_info
    }

    /// Import descriptors in table order.
    #[must_use]
    pub fn imports(&self) -> &[ImportDescriptor] {
        &self.imports
    }

    /// Names of the imported modules in table order.
    pub fn import_names(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|import| import.module_name.as_str())
    }
}
