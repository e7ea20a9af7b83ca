//! Program identification and loading.
//!
//! Bring-up asks two questions in order: what is this path (so guest memory
//! can be sized before it is allocated), and then load it. Identification is
//! by magic bytes and path shape; loading places the executable's segments
//! into guest RAM and reports the entry point.

use std::fs;
use std::path::Path;

use crate::error::LoadError;
use crate::mem::{GuestMemory, RAM_DOUBLE_SIZE, RAM_NORMAL_SIZE};
use crate::vfs::Vfs;

pub mod elf;
pub mod pbp;
pub mod sfo;

use pbp::PbpFile;
use sfo::SfoFile;

/// Guest path of the boot executable inside a disc layout.
const DISC_BOOT_PATH: &str = "PSP_GAME/SYSDIR/EBOOT.BIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Bare MIPS ELF executable, the usual homebrew shape.
    Elf,
    /// PBP package wrapping an executable plus metadata.
    Pbp,
    /// `.iso` / `.cso` disc image.
    DiscImage,
    /// Extracted disc: a directory with the standard `PSP_GAME` layout.
    DiscDirectory,
    Unknown,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::Elf => "ELF executable",
            FileType::Pbp => "PBP package",
            FileType::DiscImage => "disc image",
            FileType::DiscDirectory => "disc directory",
            FileType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Everything bring-up needs to know before memory is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub file_type: FileType,
    /// Guest RAM size, doubled when the program's SFO carries `MEMSIZE = 1`.
    pub ram_size: u32,
    pub title: Option<String>,
    pub disc_id: Option<String>,
}

impl ProgramInfo {
    fn plain(file_type: FileType) -> Self {
        ProgramInfo {
            file_type,
            ram_size: RAM_NORMAL_SIZE,
            title: None,
            disc_id: None,
        }
    }
}

/// Classify `path` by magic bytes and path shape.
pub fn identify(path: &Path) -> Result<FileType, LoadError> {
    if path.is_dir() {
        return if path.join(DISC_BOOT_PATH).is_file() {
            Ok(FileType::DiscDirectory)
        } else {
            Ok(FileType::Unknown)
        };
    }
    if !path.is_file() {
        return Err(LoadError::FileNotFound(path.display().to_string()));
    }

    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("iso") | Some("cso") => return Ok(FileType::DiscImage),
        _ => {}
    }

    let mut magic = [0u8; 4];
    {
        use std::io::Read;
        let mut file = fs::File::open(path)?;
        if file.read(&mut magic)? < 4 {
            return Ok(FileType::Unknown);
        }
    }
    Ok(match magic {
        elf::ELF_MAGIC => FileType::Elf,
        pbp::PBP_MAGIC => FileType::Pbp,
        _ => FileType::Unknown,
    })
}

/// Identify `path` and pull the metadata that has to be known before guest
/// memory exists (RAM sizing, title, disc id).
pub fn inspect(path: &Path) -> Result<ProgramInfo, LoadError> {
    let file_type = identify(path)?;
    match file_type {
        FileType::Elf | FileType::DiscImage => Ok(ProgramInfo::plain(file_type)),
        FileType::Pbp => {
            let data = fs::read(path)?;
            let mut info = info_from_pbp(&data)?;
            info.file_type = FileType::Pbp;
            Ok(info)
        }
        FileType::DiscDirectory => {
            let data = fs::read(path.join(DISC_BOOT_PATH))?;
            let mut info = info_from_pbp(&data)?;
            info.file_type = FileType::DiscDirectory;
            Ok(info)
        }
        FileType::Unknown => Err(LoadError::UnrecognizedFormat(format!(
            "{} (identified as: {file_type})",
            path.display()
        ))),
    }
}

fn info_from_pbp(data: &[u8]) -> Result<ProgramInfo, LoadError> {
    let package = PbpFile::parse(data)?;
    let mut info = ProgramInfo::plain(FileType::Pbp);
    if let Some(raw) = package.param_sfo() {
        let params = SfoFile::parse(raw)?;
        if params.int("MEMSIZE") == Some(1) {
            info.ram_size = RAM_DOUBLE_SIZE;
        }
        info.title = params.text("TITLE").map(str::to_owned);
        info.disc_id = params.text("DISC_ID").map(str::to_owned);
    }
    Ok(info)
}

/// Load the program into guest memory, mounting disc layouts as needed.
/// Returns the loaded image (entry point included).
pub fn load(
    path: &Path,
    info: &ProgramInfo,
    mem: &mut GuestMemory,
    vfs: &mut Vfs,
) -> Result<elf::ElfImage, LoadError> {
    match info.file_type {
        FileType::Elf => elf::load_into(&fs::read(path)?, mem),
        FileType::Pbp => {
            let data = fs::read(path)?;
            let package = PbpFile::parse(&data)?;
            elf::load_into(package.executable()?, mem)
        }
        FileType::DiscDirectory => {
            vfs.mount("disc0:", path);
            let boot = vfs
                .resolve(&format!("disc0:/{DISC_BOOT_PATH}"))
                .ok_or_else(|| LoadError::FileNotFound(DISC_BOOT_PATH.into()))?;
            let data = fs::read(boot)?;
            let package = PbpFile::parse(&data)?;
            elf::load_into(package.executable()?, mem)
        }
        FileType::DiscImage => Err(LoadError::Unsupported(
            "disc filesystem driver not available".into(),
        )),
        FileType::Unknown => Err(LoadError::UnrecognizedFormat(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::elf::testelf::{TEST_ENTRY, minimal_elf};
    use super::pbp::testpbp::build_pbp;
    use super::sfo::testsfo::build_sfo;
    use super::sfo::SfoValue;
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tachyon-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_identify_by_magic_and_shape() {
        let elf_path = scratch("demo.bin");
        fs::write(&elf_path, minimal_elf(&[0], 0)).unwrap();
        assert_eq!(identify(&elf_path).unwrap(), FileType::Elf);

        let pbp_path = scratch("EBOOT.PBP");
        fs::write(&pbp_path, build_pbp(&[], &minimal_elf(&[0], 0))).unwrap();
        assert_eq!(identify(&pbp_path).unwrap(), FileType::Pbp);

        let iso_path = scratch("game.iso");
        fs::write(&iso_path, b"whatever").unwrap();
        assert_eq!(identify(&iso_path).unwrap(), FileType::DiscImage);

        let junk_path = scratch("junk.dat");
        fs::write(&junk_path, b"not a program").unwrap();
        assert_eq!(identify(&junk_path).unwrap(), FileType::Unknown);

        assert!(matches!(
            identify(Path::new("/does/not/exist")),
            Err(LoadError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_inspect_reads_sfo_metadata() {
        let sfo = build_sfo(&[
            ("TITLE", SfoValue::Text("Remaster".into())),
            ("DISC_ID", SfoValue::Text("TACH00002".into())),
            ("MEMSIZE", SfoValue::Int(1)),
        ]);
        let path = scratch("remaster.pbp");
        fs::write(&path, build_pbp(&sfo, &minimal_elf(&[0], 0))).unwrap();

        let info = inspect(&path).unwrap();
        assert_eq!(info.file_type, FileType::Pbp);
        assert_eq!(info.ram_size, RAM_DOUBLE_SIZE);
        assert_eq!(info.title.as_deref(), Some("Remaster"));
        assert_eq!(info.disc_id.as_deref(), Some("TACH00002"));
    }

    #[test]
    fn test_inspect_defaults_without_sfo() {
        let path = scratch("plain.pbp");
        fs::write(&path, build_pbp(&[], &minimal_elf(&[0], 0))).unwrap();

        let info = inspect(&path).unwrap();
        assert_eq!(info.ram_size, RAM_NORMAL_SIZE);
        assert_eq!(info.title, None);
    }

    #[test]
    fn test_load_pbp_places_executable() {
        let path = scratch("boot.pbp");
        fs::write(&path, build_pbp(&[], &minimal_elf(&[0xaa, 0xbb], 0))).unwrap();

        let info = inspect(&path).unwrap();
        let mut mem = GuestMemory::new(info.ram_size);
        let mut vfs = Vfs::new();
        let image = load(&path, &info, &mut mem, &mut vfs).unwrap();

        assert_eq!(image.entry, TEST_ENTRY);
        assert_eq!(mem.read(TEST_ENTRY, 2).unwrap(), &[0xaa, 0xbb]);
        assert!(vfs.mounts().is_empty());
    }

    #[test]
    fn test_load_disc_directory_mounts_and_boots() {
        let root = scratch("discdir");
        let sysdir = root.join("PSP_GAME/SYSDIR");
        fs::create_dir_all(&sysdir).unwrap();
        let sfo = build_sfo(&[("TITLE", SfoValue::Text("Disc Game".into()))]);
        fs::write(
            sysdir.join("EBOOT.BIN"),
            build_pbp(&sfo, &minimal_elf(&[0x11], 0)),
        )
        .unwrap();

        assert_eq!(identify(&root).unwrap(), FileType::DiscDirectory);
        let info = inspect(&root).unwrap();
        assert_eq!(info.title.as_deref(), Some("Disc Game"));

        let mut mem = GuestMemory::new(info.ram_size);
        let mut vfs = Vfs::new();
        let image = load(&root, &info, &mut mem, &mut vfs).unwrap();
        assert_eq!(image.entry, TEST_ENTRY);
        assert_eq!(vfs.mounts()[0].device, "disc0:");
    }

    #[test]
    fn test_disc_images_are_recognized_but_refused() {
        let path = scratch("refused.iso");
        fs::write(&path, b"CD001").unwrap();

        let info = inspect(&path).unwrap();
        assert_eq!(info.file_type, FileType::DiscImage);

        let mut mem = GuestMemory::new(info.ram_size);
        let mut vfs = Vfs::new();
        assert!(matches!(
            load(&path, &info, &mut mem, &mut vfs),
            Err(LoadError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unknown_files_name_the_identification() {
        let path = scratch("mystery.dat");
        fs::write(&path, b"????").unwrap();
        let err = inspect(&path).unwrap_err();
        assert!(err.to_string().contains("unknown"));
    }
}
