//! Host interface: everything the interpreter core asks of its environment
//!
//! The core is host-agnostic; porting means implementing [`Host`]. The
//! standard implementation talks to a POSIX terminal and the local
//! filesystem. Character output can be redirected to a named byte stream
//! (SAVE) and character input can come from one (LOAD), one of each at a
//! time.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::thread;
use std::time::Duration;

use log::debug;

/// End-of-file sentinel returned by `getch`.
pub const EOFC: u8 = 0x1A;

pub trait Host {
    /// Read one byte from the keyboard or the open read stream; [`EOFC`]
    /// at end of input.
    fn getch(&mut self) -> u8;
    /// Write one byte to the screen or the open write stream.
    fn putch(&mut self, b: u8);
    /// Write the platform end-of-line sequence.
    fn put_nl(&mut self);

    fn open_read(&mut self, name: &str) -> bool;
    fn open_write(&mut self, name: &str) -> bool;
    fn close_file(&mut self);

    /// Byte-addressable 64 KiB memory for PEEK and POKE, owned by the host
    /// and distinct from the interpreter arena.
    fn peek(&mut self, addr: u16) -> u8;
    fn poke(&mut self, addr: u16, val: u8);

    /// Port I/O; hosts without ports may stub these.
    fn inp(&mut self, port: u16) -> u8;
    fn outp(&mut self, port: u16, val: u8);

    /// Pseudorandom value in `[0, n)`.
    fn rand(&mut self, n: u16) -> u16;
    fn sleep_ms(&mut self, ms: u16);

    /// Non-blocking check for a pending keypress.
    fn kbhit(&mut self) -> bool;
    /// Returns true when raw mode (and with it manual echo) is active.
    fn enable_raw_mode(&mut self) -> bool;
    fn disable_raw_mode(&mut self);
}

/// Park–Miller minimal standard generator. The constants are part of the
/// interpreter contract: tests may depend on the exact sequence from seed 1.
pub struct Lcg {
    seed: i64,
}

impl Lcg {
    const A: i64 = 16807;
    const M: i64 = 2147483647;
    const Q: i64 = 127773;
    const R: i64 = 2836;

    pub fn new() -> Self {
        Lcg { seed: 1 }
    }

    pub fn next(&mut self, n: u16) -> u16 {
        let hi = self.seed / Self::Q;
        let lo = self.seed % Self::Q;
        let test = Self::A * lo - Self::R * hi;
        self.seed = if test > 0 { test } else { test + Self::M };
        if n == 0 {
            0
        } else {
            (self.seed % n as i64) as u16
        }
    }
}

/// Host backed by stdin/stdout, the local filesystem, and termios.
pub struct StdHost {
    r_file: Option<BufReader<File>>,
    w_file: Option<BufWriter<File>>,
    memory: Vec<u8>,
    lcg: Lcg,
    saved_termios: Option<libc::termios>,
}

impl StdHost {
    pub fn new() -> Self {
        StdHost {
            r_file: None,
            w_file: None,
            memory: vec![0; 65536],
            lcg: Lcg::new(),
            saved_termios: None,
        }
    }
}

impl Host for StdHost {
    fn getch(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        let got = match self.r_file {
            Some(ref mut f) => f.read(&mut byte),
            None => std::io::stdin().read(&mut byte),
        };
        match got {
            Ok(1) => byte[0],
            _ => EOFC,
        }
    }

    fn putch(&mut self, b: u8) {
        if let Some(ref mut f) = self.w_file {
            let _ = f.write_all(&[b]);
        } else {
            let mut out = std::io::stdout();
            let _ = out.write_all(&[b]);
            let _ = out.flush();
        }
    }

    fn put_nl(&mut self) {
        self.putch(b'\n');
    }

    fn open_read(&mut self, name: &str) -> bool {
        debug!("open_read {name}");
        match File::open(name) {
            Ok(f) => {
                self.r_file = Some(BufReader::new(f));
                true
            }
            Err(e) => {
                debug!("open_read {name}: {e}");
                false
            }
        }
    }

    fn open_write(&mut self, name: &str) -> bool {
        debug!("open_write {name}");
        match File::create(name) {
            Ok(f) => {
                self.w_file = Some(BufWriter::new(f));
                true
            }
            Err(e) => {
                debug!("open_write {name}: {e}");
                false
            }
        }
    }

    fn close_file(&mut self) {
        if let Some(mut f) = self.w_file.take() {
            let _ = f.flush();
        }
        self.r_file = None;
    }

    fn peek(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn poke(&mut self, addr: u16, val: u8) {
        self.memory[addr as usize] = val;
    }

    fn inp(&mut self, port: u16) -> u8 {
        debug!("inp {port:#04x}");
        0
    }

    fn outp(&mut self, port: u16, val: u8) {
        debug!("outp {port:#04x}, {val:#04x}");
    }

    fn rand(&mut self, n: u16) -> u16 {
        self.lcg.next(n)
    }

    fn sleep_ms(&mut self, ms: u16) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn kbhit(&mut self) -> bool {
        if self.saved_termios.is_none() {
            return false;
        }
        let mut pending: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(0, libc::FIONREAD as _, &mut pending) };
        rc == 0 && pending > 0
    }

    fn enable_raw_mode(&mut self) -> bool {
        unsafe {
            if libc::isatty(0) == 0 {
                return false;
            }
            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(0, &mut term) != 0 {
                return false;
            }
            let saved = term;
            term.c_lflag &= !(libc::ICANON | libc::ECHO);
            if libc::tcsetattr(0, libc::TCSANOW, &term) != 0 {
                return false;
            }
            self.saved_termios = Some(saved);
        }
        true
    }

    fn disable_raw_mode(&mut self) {
        if let Some(saved) = self.saved_termios.take() {
            unsafe {
                libc::tcsetattr(0, libc::TCSANOW, &saved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_sequence_from_seed_one() {
        // First internal states: 16807, 282475249, 1622650073.
        let mut lcg = Lcg::new();
        assert_eq!(lcg.next(10000), 6807);
        assert_eq!(lcg.next(10000), 5249);
        assert_eq!(lcg.next(10000), 73);
    }

    #[test]
    fn test_lcg_range() {
        let mut lcg = Lcg::new();
        for _ in 0..1000 {
            assert!(lcg.next(7) < 7);
        }
    }

    #[test]
    fn test_lcg_zero_bound() {
        let mut lcg = Lcg::new();
        assert_eq!(lcg.next(0), 0);
    }
}
