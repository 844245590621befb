/*Estructuras del fsck: FsckReport, donde se acumulan los errores
separados en problemas de bloques y problemas de entradas. */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckReport {
    /// Bitmap and extents agree.
    pub blocks_ok: bool,
    /// Directory structure and size caches agree.
    pub entries_ok: bool,
    pub errors: Vec<String>,
}

impl FsckReport {
    pub fn new() -> Self {
        Self {
            blocks_ok: true,
            entries_ok: true,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn block_error(&mut self, msg: String) {
        self.blocks_ok = false;
        self.errors.push(msg);
    }

    pub(crate) fn entry_error(&mut self, msg: String) {
        self.entries_ok = false;
        self.errors.push(msg);
    }
}

impl Default for FsckReport {
    fn default() -> Self {
        Self::new()
    }
}
