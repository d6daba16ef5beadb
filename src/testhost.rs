//! Scripted in-memory host for interpreter tests

use std::collections::{HashMap, VecDeque};

use crate::host::{Host, Lcg, EOFC};
use crate::scan::CTRLC;

/// A [`Host`] that reads keystrokes from a queue, captures screen output,
/// and keeps named byte streams in a map. A Ctrl-C at the front of the
/// queue is reported by `kbhit`, which lets tests exercise the break path.
pub struct ScriptHost {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    pub files: HashMap<String, Vec<u8>>,
    pub memory: Vec<u8>,
    pub ports: Vec<(u16, u8)>,
    pub slept: Vec<u16>,
    reading: Option<VecDeque<u8>>,
    writing: Option<(String, Vec<u8>)>,
    lcg: Lcg,
}

impl ScriptHost {
    pub fn new() -> Self {
        ScriptHost {
            input: VecDeque::new(),
            output: Vec::new(),
            files: HashMap::new(),
            memory: vec![0; 65536],
            ports: Vec::new(),
            slept: Vec::new(),
            reading: None,
            writing: None,
            lcg: Lcg::new(),
        }
    }
}

impl Host for ScriptHost {
    fn getch(&mut self) -> u8 {
        match self.reading {
            Some(ref mut stream) => stream.pop_front().unwrap_or(EOFC),
            None => self.input.pop_front().unwrap_or(EOFC),
        }
    }

    fn putch(&mut self, b: u8) {
        match self.writing {
            Some((_, ref mut buf)) => buf.push(b),
            None => self.output.push(b),
        }
    }

    fn put_nl(&mut self) {
        self.putch(b'\n');
    }

    fn open_read(&mut self, name: &str) -> bool {
        match self.files.get(name) {
            Some(bytes) => {
                self.reading = Some(bytes.iter().copied().collect());
                true
            }
            None => false,
        }
    }

    fn open_write(&mut self, name: &str) -> bool {
        self.writing = Some((name.to_owned(), Vec::new()));
        true
    }

    fn close_file(&mut self) {
        if let Some((name, buf)) = self.writing.take() {
            self.files.insert(name, buf);
        }
        self.reading = None;
    }

    fn peek(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn poke(&mut self, addr: u16, val: u8) {
        self.memory[addr as usize] = val;
    }

    fn inp(&mut self, _port: u16) -> u8 {
        0
    }

    fn outp(&mut self, port: u16, val: u8) {
        self.ports.push((port, val));
    }

    fn rand(&mut self, n: u16) -> u16 {
        self.lcg.next(n)
    }

    fn sleep_ms(&mut self, ms: u16) {
        self.slept.push(ms);
    }

    fn kbhit(&mut self) -> bool {
        self.reading.is_none() && self.input.front() == Some(&CTRLC)
    }

    fn enable_raw_mode(&mut self) -> bool {
        false
    }

    fn disable_raw_mode(&mut self) {}
}
