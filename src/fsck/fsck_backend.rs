/*Define la interfaz para el backend del fsck.
El trait describe lo que el fsck necesita leer: superblock, bitmap
y las entradas de un directorio. Lo implementa el volumen real
(SacsFilesystem) y el mock de las pruebas.
*/

use crate::alloc::read_bitmap;
use crate::dir::{self, DOT_SLOT};
use crate::error::Result;
use crate::fs::SacsFilesystem;
use crate::layout::{DirEntry, Superblock};

/// What the checker needs to read from a volume.
pub trait FsckBackend {
    fn load_superblock(&self) -> Result<Superblock>;
    /// Occupancy of every block, `true` = used.
    fn load_bitmap(&self) -> Result<Vec<bool>>;
    /// VALID entries of the directory at `start_block`, in slot order.
    fn read_dir(&self, start_block: u32) -> Result<Vec<DirEntry>>;
}

impl FsckBackend for SacsFilesystem {
    fn load_superblock(&self) -> Result<Superblock> {
        Ok(*self.superblock())
    }

    fn load_bitmap(&self) -> Result<Vec<bool>> {
        read_bitmap(self.volume(), self.superblock())
    }

    fn read_dir(&self, start_block: u32) -> Result<Vec<DirEntry>> {
        let dot = self.volume().read_entry(start_block, DOT_SLOT)?;
        dir::entries(self.volume(), &dot).collect()
    }
}
