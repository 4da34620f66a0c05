use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// A scratch directory unique to this test process + thread, cleaned up on
/// drop. Standing in for a `tempfile`-crate fixture without adding a new
/// dependency for what this binary only needs in tests.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(tag: &str) -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("teefan-test-{tag}-{}-{nanos}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        ScratchDir(dir)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_teefan"))
}

fn run_teefan(args: &[&str], stdin_data: &[u8]) -> std::process::ExitStatus {
    let mut child = Command::new(bin())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn teefan");

    child.stdin.take().unwrap().write_all(stdin_data).unwrap();
    let output = child.wait_with_output().unwrap();
    if !output.status.success() {
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    output.status
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_default()
}

#[test]
fn replicate_two_files() {
    let dir = ScratchDir::new("replicate");
    let a = dir.path("a");
    let b = dir.path("b");

    let status = run_teefan(
        &["-b", "4", a.to_str().unwrap(), b.to_str().unwrap()],
        b"hello\nworld\n",
    );

    assert!(status.success());
    assert_eq!(read(&a), b"hello\nworld\n");
    assert_eq!(read(&b), b"hello\nworld\n");
}

#[test]
fn scatter_byte_mode_exact_division() {
    let dir = ScratchDir::new("scatter-byte");
    let paths: Vec<PathBuf> = (0..4).map(|i| dir.path(&format!("out{i}"))).collect();
    let path_strs: Vec<&str> = paths.iter().map(|p| p.to_str().unwrap()).collect();

    let mut args = vec!["-s", "-b", "16"];
    args.extend(path_strs.iter());

    let status = run_teefan(&args, b"ABCDEFGH");
    assert!(status.success());

    let concatenated: Vec<u8> = paths.iter().flat_map(|p| read(p)).collect();
    assert_eq!(concatenated, b"ABCDEFGH");
}

#[test]
fn scatter_line_mode_small_buffer_deferral() {
    let dir = ScratchDir::new("scatter-line");
    let a = dir.path("a");
    let b = dir.path("b");

    let status = run_teefan(
        &["-s", "-l", "-b", "4096", a.to_str().unwrap(), b.to_str().unwrap()],
        b"aaa\nbb\nccc\n",
    );
    assert!(status.success());

    let out_a = read(&a);
    let out_b = read(&b);
    let mut combined = out_a.clone();
    combined.extend_from_slice(&out_b);
    assert_eq!(combined, b"aaa\nbb\nccc\n");

    for out in [&out_a, &out_b] {
        if !out.is_empty() {
            assert_eq!(*out.last().unwrap(), b'\n');
        }
    }
}

#[test]
fn scatter_line_mode_no_newline_is_fatal() {
    let dir = ScratchDir::new("scatter-line-fatal");
    let a = dir.path("a");

    let data = vec![b'x'; 4096];
    let status = run_teefan(&["-s", "-l", "-b", "2048", a.to_str().unwrap()], &data);

    assert_eq!(status.code(), Some(1));
}

#[test]
fn broken_pipe_does_not_affect_other_sinks() {
    let dir = ScratchDir::new("broken-pipe");
    let regular = dir.path("regular");
    let fifo = dir.path("fifo");

    let status = Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .expect("spawn mkfifo");
    assert!(status.success(), "mkfifo failed");

    // Open the FIFO for reading in a background thread before starting
    // teefan. Both this open and teefan's own open of the same path block
    // until the other side connects, so there is no race: whichever
    // reaches its open() call second unblocks both. Once connected, read a
    // few bytes and drop the file — closing the read end early, the way a
    // short-lived downstream reader would.
    let reader_path = fifo.clone();
    let reader = thread::spawn(move || {
        let mut f = fs::File::open(&reader_path).expect("open fifo for reading");
        let mut buf = [0u8; 64];
        let _ = f.read(&mut buf);
    });

    let data = vec![b'x'; 256 * 1024];
    let status = run_teefan(
        &["-b", "4096", regular.to_str().unwrap(), fifo.to_str().unwrap()],
        &data,
    );

    reader.join().expect("reader thread panicked");

    assert!(status.success());
    assert_eq!(read(&regular), data);
}

#[test]
fn usage_error_on_zero_buffer_size_exits_one() {
    let dir = ScratchDir::new("usage");
    let a = dir.path("a");
    let status = run_teefan(&["-b", "0", a.to_str().unwrap()], b"");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn missing_output_argument_exits_one() {
    let status = run_teefan(&[], b"");
    assert_eq!(status.code(), Some(1));
}
