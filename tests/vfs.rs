//! End-to-end filesystem scenarios, run against an in-memory disk.

use std::sync::Arc;

use wren::drivers::{DevId, MEM_MAJOR};
use wren::fs::s5::S5Fs;
use wren::fs::{Mode, OFlags, Whence};
use wren::hal::{BlockDevice, MemDisk};
use wren::kernel::Kernel;
use wren::page::PAGE_SIZE;
use wren::param::{MAX_FILE_SIZE, NFILES};
use wren::proc::Proc;
use wren::KernelError;

fn boot() -> (Arc<Kernel>, Arc<Proc>) {
    let disk: Arc<dyn BlockDevice> = MemDisk::new(512);
    S5Fs::format(&disk, 128).unwrap();
    let kernel = Kernel::boot(disk).unwrap();
    let init = kernel.spawn_init();
    (kernel, init)
}

#[test]
fn create_write_read_unlink() {
    let (kernel, p) = boot();
    let fd = p.open(b"/a", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"hello"), Ok(5));
    assert_eq!(p.lseek(fd, 0, Whence::Set), Ok(0));
    let mut buf = [0u8; 5];
    assert_eq!(p.read(fd, &mut buf), Ok(5));
    assert_eq!(&buf, b"hello");
    p.close(fd).unwrap();
    p.unlink(b"/a").unwrap();
    assert_eq!(
        p.open(b"/a", OFlags::empty()).unwrap_err(),
        KernelError::NoEntry
    );
    assert!(kernel.fs().check_refcounts().unwrap());
}

#[test]
fn sparse_file() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/s", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.lseek(fd, 2 * PAGE_SIZE as isize, Whence::Set), Ok(8192));
    assert_eq!(p.write(fd, b"x"), Ok(1));

    let st = p.stat(b"/s").unwrap();
    assert_eq!(st.size, 8193);
    assert_eq!(st.blocks, 1);

    p.lseek(fd, 0, Whence::Set).unwrap();
    let mut buf = vec![0xffu8; 8193];
    assert_eq!(p.read(fd, &mut buf), Ok(8193));
    assert!(buf[..8192].iter().all(|b| *b == 0));
    assert_eq!(buf[8192], b'x');
    p.close(fd).unwrap();
}

#[test]
fn hardlink_semantics() {
    let (kernel, p) = boot();
    let fd = p.open(b"/a", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"shared bytes"), Ok(12));
    p.close(fd).unwrap();

    p.link(b"/a", b"/b").unwrap();
    let sta = p.stat(b"/a").unwrap();
    let stb = p.stat(b"/b").unwrap();
    assert_eq!(sta.ino, stb.ino);
    assert_eq!(sta.nlink, 2);

    p.unlink(b"/a").unwrap();
    let fd = p.open(b"/b", OFlags::empty()).unwrap();
    let mut buf = [0u8; 12];
    assert_eq!(p.read(fd, &mut buf), Ok(12));
    assert_eq!(&buf, b"shared bytes");
    p.close(fd).unwrap();

    let free_inodes = kernel.fs().count_free_inodes().unwrap();
    p.unlink(b"/b").unwrap();
    // The last name is gone and no descriptor holds it: reclaimed.
    assert_eq!(kernel.fs().count_free_inodes().unwrap(), free_inodes + 1);
    assert!(kernel.fs().check_refcounts().unwrap());
}

#[test]
fn unlinked_file_lives_until_last_close() {
    let (kernel, p) = boot();
    let fd = p.open(b"/tmpfile", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"still here"), Ok(10));
    let free_inodes = kernel.fs().count_free_inodes().unwrap();

    p.unlink(b"/tmpfile").unwrap();
    assert_eq!(
        p.stat(b"/tmpfile").unwrap_err(),
        KernelError::NoEntry
    );
    // The descriptor still reads the contents.
    p.lseek(fd, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(p.read(fd, &mut buf), Ok(10));
    assert_eq!(&buf, b"still here");
    assert_eq!(kernel.fs().count_free_inodes().unwrap(), free_inodes);

    p.close(fd).unwrap();
    assert_eq!(kernel.fs().count_free_inodes().unwrap(), free_inodes + 1);
}

#[test]
fn rmdir_safety() {
    let (kernel, p) = boot();
    p.mkdir(b"/d").unwrap();
    let fd = p.open(b"/d/x", OFlags::CREATE).unwrap();
    p.close(fd).unwrap();

    assert_eq!(p.rmdir(b"/d").unwrap_err(), KernelError::NotEmpty);
    p.unlink(b"/d/x").unwrap();
    p.rmdir(b"/d").unwrap();
    assert_eq!(p.stat(b"/d").unwrap_err(), KernelError::NoEntry);
    assert!(kernel.fs().check_refcounts().unwrap());
}

#[test]
fn mkdir_rmdir_restores_free_lists() {
    let (kernel, p) = boot();
    let free_inodes = kernel.fs().count_free_inodes().unwrap();
    let free_blocks = kernel.fs().count_free_blocks().unwrap();

    p.mkdir(b"/dir").unwrap();
    p.rmdir(b"/dir").unwrap();

    assert_eq!(kernel.fs().count_free_inodes().unwrap(), free_inodes);
    assert_eq!(kernel.fs().count_free_blocks().unwrap(), free_blocks);
    assert!(kernel.fs().check_refcounts().unwrap());
}

#[test]
fn directory_compaction_keeps_order() {
    let (_kernel, p) = boot();
    p.mkdir(b"/d").unwrap();
    for name in [&b"/d/A"[..], b"/d/B", b"/d/C"] {
        let fd = p.open(name, OFlags::CREATE).unwrap();
        p.close(fd).unwrap();
    }
    p.unlink(b"/d/B").unwrap();

    let fd = p.open(b"/d", OFlags::empty()).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = p.getdent(fd).unwrap() {
        names.push(entry.name_bytes().to_vec());
    }
    p.close(fd).unwrap();
    assert_eq!(
        names,
        [&b"."[..], b"..", b"A", b"C"]
            .iter()
            .map(|n| n.to_vec())
            .collect::<Vec<_>>()
    );
}

#[test]
fn rename_moves_a_name() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/old", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"payload"), Ok(7));
    p.close(fd).unwrap();

    p.rename(b"/old", b"/new").unwrap();
    assert_eq!(p.stat(b"/old").unwrap_err(), KernelError::NoEntry);
    let fd = p.open(b"/new", OFlags::empty()).unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(p.read(fd, &mut buf), Ok(7));
    assert_eq!(&buf, b"payload");
    p.close(fd).unwrap();
}

#[test]
fn dup_and_dup2_share_the_offset() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/f", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"0123456789"), Ok(10));
    p.lseek(fd, 0, Whence::Set).unwrap();

    let fd2 = p.dup(fd).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(p.read(fd, &mut buf), Ok(4));
    assert_eq!(p.read(fd2, &mut buf), Ok(4));
    assert_eq!(&buf, b"4567");

    let fd3 = p.dup2(fd, 7).unwrap();
    assert_eq!(fd3, 7);
    assert_eq!(p.read(fd3, &mut buf), Ok(2));
    assert_eq!(&buf[..2], b"89");

    assert_eq!(p.dup2(fd, fd), Ok(fd));
    p.close(fd).unwrap();
    p.close(fd2).unwrap();
    p.close(fd3).unwrap();
}

#[test]
fn append_mode_writes_at_end() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/log", OFlags::CREATE | OFlags::WRONLY).unwrap();
    assert_eq!(p.write(fd, b"first"), Ok(5));
    p.close(fd).unwrap();

    let fd = p
        .open(b"/log", OFlags::WRONLY | OFlags::APPEND)
        .unwrap();
    assert_eq!(p.write(fd, b"+second"), Ok(7));
    p.close(fd).unwrap();

    let fd = p.open(b"/log", OFlags::empty()).unwrap();
    let mut buf = [0u8; 12];
    assert_eq!(p.read(fd, &mut buf), Ok(12));
    assert_eq!(&buf, b"first+second");
    p.close(fd).unwrap();
}

#[test]
fn chdir_resolves_relative_paths() {
    let (_kernel, p) = boot();
    p.mkdir(b"/home").unwrap();
    p.chdir(b"/home").unwrap();
    let fd = p.open(b"note", OFlags::CREATE).unwrap();
    p.close(fd).unwrap();
    assert_eq!(p.stat(b"/home/note").unwrap().mode, Mode::Regular);
    assert_eq!(p.stat(b"..").unwrap().ino, p.stat(b"/").unwrap().ino);
    p.chdir(b"..").unwrap();
    assert!(p.stat(b"home/note").is_ok());
    assert_eq!(
        p.chdir(b"/home/note").unwrap_err(),
        KernelError::NotADirectory
    );
}

#[test]
fn path_resolution_error_cases() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/plain", OFlags::CREATE).unwrap();
    p.close(fd).unwrap();

    assert_eq!(p.open(b"", OFlags::empty()).unwrap_err(), KernelError::InvalidArgument);
    assert_eq!(
        p.open(b"/plain/sub", OFlags::empty()).unwrap_err(),
        KernelError::NotADirectory
    );
    assert_eq!(
        p.open(b"/missing/sub", OFlags::empty()).unwrap_err(),
        KernelError::NoEntry
    );
    let long = [b'n'; 40];
    let mut path = b"/".to_vec();
    path.extend_from_slice(&long);
    assert_eq!(
        p.open(&path, OFlags::empty()).unwrap_err(),
        KernelError::NameTooLong
    );
    assert_eq!(
        p.open(b"/plain", OFlags::WRONLY | OFlags::RDWR).unwrap_err(),
        KernelError::InvalidArgument
    );
    // Directories open read-only.
    assert_eq!(
        p.open(b"/", OFlags::RDWR).unwrap_err(),
        KernelError::IsDirectory
    );
    let fd = p.open(b"/", OFlags::empty()).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(p.read(fd, &mut buf).unwrap_err(), KernelError::IsDirectory);
    p.close(fd).unwrap();
}

#[test]
fn fd_error_cases() {
    let (_kernel, p) = boot();
    let mut buf = [0u8; 4];
    assert_eq!(p.read(99, &mut buf).unwrap_err(), KernelError::BadFd);
    assert_eq!(p.close(3).unwrap_err(), KernelError::BadFd);

    let fd = p.open(b"/ro", OFlags::CREATE).unwrap();
    assert_eq!(p.write(fd, b"x").unwrap_err(), KernelError::BadFd);
    assert_eq!(p.lseek(fd, -1, Whence::Set).unwrap_err(), KernelError::InvalidArgument);
    assert_eq!(p.dup2(fd, NFILES).unwrap_err(), KernelError::BadFd);
    p.close(fd).unwrap();

    let mut fds = Vec::new();
    loop {
        match p.open(b"/ro", OFlags::empty()) {
            Ok(fd) => fds.push(fd),
            Err(err) => {
                assert_eq!(err, KernelError::TooManyFiles);
                break;
            }
        }
    }
    assert_eq!(fds.len(), NFILES);
    for fd in fds {
        p.close(fd).unwrap();
    }
}

#[test]
fn zero_length_io_touches_nothing() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/z", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b""), Ok(0));
    assert_eq!(p.read(fd, &mut []), Ok(0));
    assert_eq!(p.stat(b"/z").unwrap().size, 0);
    p.close(fd).unwrap();
}

#[test]
fn read_past_eof_returns_zero() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/eof", OFlags::CREATE | OFlags::RDWR).unwrap();
    assert_eq!(p.write(fd, b"abc"), Ok(3));
    let mut buf = [0u8; 8];
    assert_eq!(p.read(fd, &mut buf), Ok(0));
    p.lseek(fd, 100, Whence::Set).unwrap();
    assert_eq!(p.read(fd, &mut buf), Ok(0));
    p.close(fd).unwrap();
}

#[test]
fn write_at_max_file_size_is_invalid() {
    let (_kernel, p) = boot();
    let fd = p.open(b"/max", OFlags::CREATE | OFlags::RDWR).unwrap();
    p.lseek(fd, MAX_FILE_SIZE as isize, Whence::Set).unwrap();
    assert_eq!(p.write(fd, b"x").unwrap_err(), KernelError::InvalidArgument);
    p.close(fd).unwrap();
}

#[test]
fn indirect_blocks_round_trip() {
    let (kernel, p) = boot();
    let fd = p.open(b"/big", OFlags::CREATE | OFlags::RDWR).unwrap();
    // Land squarely in the indirect region.
    let offset = (wren::param::NDIRECT + 3) * PAGE_SIZE + 17;
    p.lseek(fd, offset as isize, Whence::Set).unwrap();
    assert_eq!(p.write(fd, b"indirect"), Ok(8));
    p.lseek(fd, offset as isize, Whence::Set).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(p.read(fd, &mut buf), Ok(8));
    assert_eq!(&buf, b"indirect");

    let st = p.stat(b"/big").unwrap();
    assert_eq!(st.size, offset + 8);
    // One data block plus the indirect block itself.
    assert_eq!(st.blocks, 2);
    p.close(fd).unwrap();

    let free_blocks = kernel.fs().count_free_blocks().unwrap();
    p.unlink(b"/big").unwrap();
    assert_eq!(
        kernel.fs().count_free_blocks().unwrap(),
        free_blocks + 2
    );
}

#[test]
fn filesystem_fills_up() {
    let disk: Arc<dyn BlockDevice> = MemDisk::new(24);
    S5Fs::format(&disk, 8).unwrap();
    let kernel = Kernel::boot(disk).unwrap();
    let p = kernel.spawn_init();

    let fd = p.open(b"/hog", OFlags::CREATE | OFlags::RDWR).unwrap();
    let chunk = vec![0xabu8; PAGE_SIZE];
    let mut wrote = 0;
    let err = loop {
        match p.write(fd, &chunk) {
            Ok(n) => wrote += n,
            Err(err) => break err,
        }
    };
    assert_eq!(err, KernelError::NoSpace);
    assert!(wrote > 0);
    assert_eq!(kernel.fs().count_free_blocks().unwrap(), 0);
    p.close(fd).unwrap();
}

#[test]
fn mknod_and_memory_devices() {
    let (_kernel, p) = boot();
    p.mkdir(b"/dev").unwrap();
    p.mknod(b"/dev/null", Mode::CharDev, DevId::new(MEM_MAJOR, 0))
        .unwrap();
    p.mknod(b"/dev/zero", Mode::CharDev, DevId::new(MEM_MAJOR, 1))
        .unwrap();
    assert_eq!(
        p.mknod(b"/dev/null", Mode::CharDev, DevId::new(MEM_MAJOR, 0))
            .unwrap_err(),
        KernelError::AlreadyExists
    );
    assert_eq!(
        p.mknod(b"/dev/file", Mode::Regular, DevId::new(0, 0))
            .unwrap_err(),
        KernelError::InvalidArgument
    );

    let fd = p.open(b"/dev/null", OFlags::RDWR).unwrap();
    let mut buf = [0xffu8; 8];
    assert_eq!(p.read(fd, &mut buf), Ok(0));
    assert_eq!(p.write(fd, b"discard"), Ok(7));
    p.close(fd).unwrap();

    let fd = p.open(b"/dev/zero", OFlags::empty()).unwrap();
    assert_eq!(p.read(fd, &mut buf), Ok(8));
    assert!(buf.iter().all(|b| *b == 0));
    p.close(fd).unwrap();
}

#[test]
fn link_rejects_directories_and_duplicates() {
    let (_kernel, p) = boot();
    p.mkdir(b"/d").unwrap();
    assert_eq!(p.link(b"/d", b"/d2").unwrap_err(), KernelError::Permission);
    assert_eq!(p.unlink(b"/d").unwrap_err(), KernelError::Permission);

    let fd = p.open(b"/a", OFlags::CREATE).unwrap();
    p.close(fd).unwrap();
    let fd = p.open(b"/b", OFlags::CREATE).unwrap();
    p.close(fd).unwrap();
    assert_eq!(p.link(b"/a", b"/b").unwrap_err(), KernelError::AlreadyExists);
}

#[test]
fn rmdir_dot_and_dotdot() {
    let (_kernel, p) = boot();
    p.mkdir(b"/d").unwrap();
    p.chdir(b"/d").unwrap();
    assert_eq!(p.rmdir(b".").unwrap_err(), KernelError::InvalidArgument);
    assert_eq!(p.rmdir(b"..").unwrap_err(), KernelError::NotEmpty);
    p.chdir(b"/").unwrap();
    p.rmdir(b"/d").unwrap();
}

#[test]
fn halt_flushes_and_data_survives_reboot() {
    let disk: Arc<dyn BlockDevice> = MemDisk::new(256);
    S5Fs::format(&disk, 64).unwrap();
    {
        let kernel = Kernel::boot(disk.clone()).unwrap();
        let p = kernel.spawn_init();
        let fd = p.open(b"/boot.log", OFlags::CREATE | OFlags::RDWR).unwrap();
        assert_eq!(p.write(fd, b"first boot"), Ok(10));
        p.close(fd).unwrap();
        p.exit(0);
        kernel.halt().unwrap();
    }
    let kernel = Kernel::boot(disk).unwrap();
    let p = kernel.spawn_init();
    let fd = p.open(b"/boot.log", OFlags::empty()).unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(p.read(fd, &mut buf), Ok(10));
    assert_eq!(&buf, b"first boot");
    p.close(fd).unwrap();
}
