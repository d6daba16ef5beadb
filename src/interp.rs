//! Statement interpreter for Not-So-Tiny BASIC
//!
//! Executes statements directly from stored source bytes. The top level is
//! a small state machine — PROMPT, EXEC, WARMSTART, EXIT — whose
//! transitions are values returned from statement handlers instead of the
//! label mesh the lineage is famous for. In direct mode the current-line
//! pointer is `None` and statements come from the line buffer; in program
//! mode it walks the stored records.

use log::debug;

use crate::arena::{
    Arena, ForFrame, GosubFrame, FOR_FRAME, FOR_FRAME_SIZE, GOSUB_FRAME, GOSUB_FRAME_SIZE,
    LINE_HDR, PGM_START,
};
use crate::arena::make_record;
use crate::error::Trap;
use crate::expr::BOUNDS_MSG;
use crate::host::{Host, EOFC};
use crate::scan::{
    ignore_blanks, scan_table, test_num, BELL, CR, CTRLC, CTRLH, DEL, KEYWORDS, KW_BYE, KW_CLEAR,
    KW_DIM, KW_END, KW_FOR, KW_GOSUB, KW_GOTO, KW_IF, KW_INPUT, KW_LIST, KW_LOAD, KW_NEW,
    KW_NEXT, KW_OUT, KW_POKE, KW_PRINT, KW_REM, KW_RETURN, KW_RUN, KW_SAVE, KW_SLEEP, KW_STOP,
    KW_SYSTEM, LINE_NUM_OVERFLOW, NL, RELOPS, RELOP_EQ, SPACE, STEP_TABLE, TO_TABLE,
};

const OK_MSG: &str = "OK";
const INIT_MSG: &str = "Not-So-Tiny BASIC";
const MEMORY_MSG: &str = " bytes free.";
const BAD_INPUT_MSG: &str = "\nBad number";
const BACKSPACE_MSG: &str = "\x08 \x08";

/// Top-level interpreter states.
enum State {
    Prompt,
    Warm,
    Exit,
}

/// Where execution picks up inside the dispatch loop.
enum Step {
    /// Dispatch the statement at the cursor.
    Interp,
    /// A statement finished; skip `:` separators or fall to the next line.
    RunNext,
    /// Advance past the current stored line.
    NextLine,
    /// The current-line pointer was repositioned; execute from its body.
    ExecLine,
}

/// What a statement handler asks the dispatch loop to do next.
enum Flow {
    /// Statement complete, continue on the same line.
    Run,
    /// Re-dispatch at the cursor without consuming separators (IF).
    Interp,
    /// Skip the rest of the line.
    NextLine,
    /// The current-line pointer was changed (RUN, GOTO, GOSUB, END).
    Exec,
    /// Back to the prompt without a warmstart (NEW).
    Prompt,
    /// Warmstart: reset the control stack, print OK, prompt (LIST, SAVE,
    /// LOAD, INPUT cancel).
    Warm,
    /// Leave the interpreter (BYE, SYSTEM).
    Exit,
}

/// Result of processing one entered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcLine {
    /// Input is exhausted.
    Eof,
    /// The line was cancelled with Ctrl-C.
    Cancelled,
    /// A numbered line was inserted or replaced.
    Okay,
    /// An unnumbered statement awaits direct execution.
    Direct,
    /// The line number was out of range.
    BadLine,
    /// A bare line number deleted its line.
    Delete,
    /// The line was empty.
    Empty,
}

enum GetLine {
    Line,
    Cancel,
    Eof,
}

pub struct Interp<H: Host> {
    pub(crate) arena: Arena,
    pub(crate) host: H,
    pub(crate) txtpos: usize,
    pub(crate) current_line: Option<usize>,
    pub(crate) exp_error: bool,
    lecho: bool,
}

impl<H: Host> Interp<H> {
    pub fn new(host: H, lecho: bool) -> Self {
        Interp {
            arena: Arena::new(),
            host,
            txtpos: PGM_START + 2,
            current_line: None,
            exp_error: false,
            lecho,
        }
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn banner(&mut self) {
        self.print_msg(INIT_MSG);
        self.print_num((self.arena.sp - self.arena.pgm_end) as i32);
        self.print_msg(MEMORY_MSG);
    }

    /// Run the top-level loop. With `autorun` the program is executed from
    /// its first line and the first warmstart exits instead of prompting.
    pub fn run(&mut self, autorun: bool) {
        let mut state = if autorun {
            self.current_line = Some(PGM_START);
            self.exec(Step::ExecLine)
        } else {
            State::Warm
        };
        loop {
            state = match state {
                State::Warm => {
                    if autorun {
                        return;
                    }
                    self.current_line = None;
                    self.arena.sp = self.arena.top_sp;
                    self.print_msg(OK_MSG);
                    State::Prompt
                }
                State::Prompt => self.prompt_step(),
                State::Exit => return,
            };
        }
    }

    fn prompt_step(&mut self) -> State {
        match self.proc_line() {
            ProcLine::Eof => State::Exit,
            ProcLine::BadLine => {
                self.print_msg(&Trap::BadLine.to_string());
                State::Prompt
            }
            ProcLine::Direct => {
                self.current_line = None;
                self.txtpos = self.arena.pgm_end + 2;
                if self.cur() == NL {
                    State::Prompt
                } else {
                    self.exec(Step::Interp)
                }
            }
            _ => State::Prompt,
        }
    }

    /// The dispatch loop: execute statements until something ends the
    /// EXEC state.
    fn exec(&mut self, entry: Step) -> State {
        let mut step = entry;
        loop {
            step = match step {
                Step::ExecLine => match self.current_line {
                    Some(at) if at == self.arena.pgm_end => return State::Warm,
                    Some(at) => {
                        self.txtpos = at + LINE_HDR;
                        Step::Interp
                    }
                    None => return State::Prompt,
                },
                Step::NextLine => match self.current_line {
                    None => return State::Prompt,
                    Some(at) => {
                        self.current_line = Some(at + self.arena.line_len(at));
                        Step::ExecLine
                    }
                },
                Step::RunNext => {
                    while self.cur() == b':' {
                        self.txtpos += 1;
                    }
                    self.skip_blanks();
                    if self.cur() == NL {
                        Step::NextLine
                    } else {
                        Step::Interp
                    }
                }
                Step::Interp => {
                    if self.current_line.is_some() && self.break_check() {
                        return self.report(Trap::Break);
                    }
                    match self.statement() {
                        Ok(Flow::Run) => Step::RunNext,
                        Ok(Flow::Interp) => Step::Interp,
                        Ok(Flow::NextLine) => Step::NextLine,
                        Ok(Flow::Exec) => Step::ExecLine,
                        Ok(Flow::Prompt) => return State::Prompt,
                        Ok(Flow::Warm) => return State::Warm,
                        Ok(Flow::Exit) => return State::Exit,
                        Err(trap) => return self.report(trap),
                    }
                }
            };
        }
    }

    fn report(&mut self, trap: Trap) -> State {
        self.print_msg(&trap.to_string());
        if trap == Trap::Syntax {
            if let Some(line) = self.current_line {
                let saved = self.arena.mem[self.txtpos];
                if saved != NL {
                    self.arena.mem[self.txtpos] = b'^';
                }
                self.print_line(line);
                self.arena.mem[self.txtpos] = saved;
            }
            self.host.put_nl();
        }
        if trap.warmstarts() {
            State::Warm
        } else {
            State::Prompt
        }
    }

    fn statement(&mut self) -> Result<Flow, Trap> {
        let kw = scan_table(&self.arena.mem, &mut self.txtpos, KEYWORDS);
        self.skip_blanks();
        match kw {
            KW_LIST => self.st_list(),
            KW_LOAD => self.st_load(),
            KW_NEW => self.st_new(),
            KW_RUN => {
                self.current_line = Some(PGM_START);
                Ok(Flow::Exec)
            }
            KW_SAVE => self.st_save(),
            KW_NEXT => self.st_next(),
            KW_IF => self.st_if(),
            KW_GOTO => self.st_goto(),
            KW_GOSUB => self.st_gosub(),
            KW_RETURN => self.frame_walk(None),
            KW_REM => Ok(Flow::NextLine),
            KW_FOR => self.st_for(),
            KW_INPUT => self.st_input(),
            KW_PRINT => self.st_print(),
            KW_POKE => self.st_poke(),
            KW_STOP => {
                self.print_msg(&Trap::Break.to_string());
                self.st_end()
            }
            KW_BYE | KW_SYSTEM => Ok(Flow::Exit),
            KW_OUT => self.st_out(),
            KW_SLEEP => self.st_sleep(),
            KW_CLEAR => {
                self.arena.clear();
                Ok(Flow::Run)
            }
            KW_DIM => self.st_dim(),
            KW_END => self.st_end(),
            // KW_LET and a bare target both assign.
            _ => self.st_let(),
        }
    }

    fn st_let(&mut self) -> Result<Flow, Trap> {
        let letter = self.cur();
        if !letter.is_ascii_uppercase() {
            return Err(Trap::Syntax);
        }
        let index = if self.at(1) == b'(' {
            self.txtpos += 2;
            self.exp_error = false;
            let index = self.expression();
            if self.exp_error || self.cur() != b')' {
                return Err(Trap::InvalidExpr);
            }
            self.txtpos += 1;
            if self.arena.array_get(letter, index).is_none() {
                self.print_msg(BOUNDS_MSG);
                return Err(Trap::InvalidExpr);
            }
            Some(index)
        } else {
            self.txtpos += 1;
            None
        };
        self.skip_blanks();
        if self.cur() != b'=' {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        self.skip_blanks();
        self.exp_error = false;
        let value = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        match index {
            Some(i) => {
                self.arena.array_set(letter, i, value);
            }
            None => self.arena.var_set(letter, value),
        }
        Ok(Flow::Run)
    }

    fn st_if(&mut self) -> Result<Flow, Trap> {
        self.exp_error = false;
        let val = self.expression();
        if self.exp_error || self.cur() == NL {
            return Err(Trap::InvalidExpr);
        }
        if val != 0 {
            Ok(Flow::Interp)
        } else {
            Ok(Flow::NextLine)
        }
    }

    fn st_goto(&mut self) -> Result<Flow, Trap> {
        self.exp_error = false;
        let num = self.expression();
        if self.exp_error || self.cur() != NL {
            return Err(Trap::InvalidExpr);
        }
        self.current_line = Some(self.arena.find_line(num as u16));
        Ok(Flow::Exec)
    }

    fn st_gosub(&mut self) -> Result<Flow, Trap> {
        self.exp_error = false;
        let num = self.expression();
        if self.exp_error || self.cur() != NL {
            return Err(Trap::InvalidExpr);
        }
        self.arena
            .push_gosub_frame(GosubFrame {
                txtpos: self.txtpos as u16,
                line: self.encode_line(),
            })
            .map_err(|_| Trap::NoMem)?;
        self.current_line = Some(self.arena.find_line(num as u16));
        Ok(Flow::Exec)
    }

    fn st_for(&mut self) -> Result<Flow, Trap> {
        let letter = self.cur();
        if !letter.is_ascii_uppercase() {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        if scan_table(&self.arena.mem, &mut self.txtpos, RELOPS) != RELOP_EQ {
            return Err(Trap::Syntax);
        }
        self.exp_error = false;
        let initial = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        if scan_table(&self.arena.mem, &mut self.txtpos, TO_TABLE) != 0 {
            return Err(Trap::Syntax);
        }
        let terminal = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        let step = if scan_table(&self.arena.mem, &mut self.txtpos, STEP_TABLE) == 0 {
            let step = self.expression();
            if self.exp_error {
                return Err(Trap::InvalidExpr);
            }
            step
        } else {
            1
        };
        // FOR must end its line; the frame's saved cursor is the newline.
        if !self.check_statement_end() || self.cur() != NL {
            return Err(Trap::Syntax);
        }
        self.arena
            .push_for_frame(ForFrame {
                var: letter,
                terminal,
                step,
                txtpos: self.txtpos as u16,
                line: self.encode_line(),
            })
            .map_err(|_| Trap::NoMem)?;
        self.arena.var_set(letter, initial);
        Ok(Flow::Run)
    }

    fn st_next(&mut self) -> Result<Flow, Trap> {
        self.skip_blanks();
        let letter = self.cur();
        if !letter.is_ascii_uppercase() {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        self.frame_walk(Some(letter))
    }

    /// Walk frames from the stack pointer toward the stack top. RETURN
    /// resumes at the nearest gosub frame; NEXT at the nearest FOR frame
    /// with a matching loop variable.
    fn frame_walk(&mut self, next_var: Option<u8>) -> Result<Flow, Trap> {
        let mut at = self.arena.sp;
        while at < self.arena.top_sp {
            match self.arena.mem[at] {
                GOSUB_FRAME => {
                    if next_var.is_none() {
                        let f = self.arena.gosub_frame(at);
                        self.txtpos = f.txtpos as usize;
                        self.current_line = Self::decode_line(f.line);
                        self.arena.sp = at + GOSUB_FRAME_SIZE;
                        return Ok(Flow::Run);
                    }
                    at += GOSUB_FRAME_SIZE;
                }
                FOR_FRAME => {
                    if let Some(var) = next_var {
                        let f = self.arena.for_frame(at);
                        if f.var == var {
                            let updated = self.arena.var_get(var).wrapping_add(f.step);
                            self.arena.var_set(var, updated);
                            let looping = (f.step > 0 && updated <= f.terminal)
                                || (f.step < 0 && updated >= f.terminal);
                            if looping {
                                self.txtpos = f.txtpos as usize;
                                self.current_line = Self::decode_line(f.line);
                                // Keep the frame; drop any inner frames
                                // left behind by non-local exits.
                                self.arena.sp = at;
                            } else {
                                self.arena.sp = at + FOR_FRAME_SIZE;
                            }
                            return Ok(Flow::Run);
                        }
                    }
                    at += FOR_FRAME_SIZE;
                }
                _ => return Err(Trap::StackStuffed),
            }
        }
        Err(Trap::Syntax)
    }

    fn st_input(&mut self) -> Result<Flow, Trap> {
        self.skip_blanks();
        let letter = self.cur();
        if !letter.is_ascii_uppercase() {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        let resume = self.txtpos;
        loop {
            match self.getln(Some(b'?')) {
                GetLine::Line => {}
                GetLine::Cancel | GetLine::Eof => return Ok(Flow::Warm),
            }
            self.txtpos = self.arena.pgm_end + 2;
            let negative = self.cur() == b'-';
            if negative {
                self.txtpos += 1;
            }
            let mut value: i16 = 0;
            let mut digits = 0;
            while self.cur().is_ascii_digit() {
                value = value.wrapping_mul(10).wrapping_add((self.cur() - b'0') as i16);
                digits += 1;
                self.txtpos += 1;
            }
            self.skip_blanks();
            if digits == 0 || self.cur() != NL {
                self.print_msg(BAD_INPUT_MSG);
                continue;
            }
            self.arena
                .var_set(letter, if negative { value.wrapping_neg() } else { value });
            break;
        }
        self.txtpos = resume;
        Ok(Flow::Run)
    }

    fn st_print(&mut self) -> Result<Flow, Trap> {
        if self.cur() == b':' {
            self.host.put_nl();
            self.txtpos += 1;
            return Ok(Flow::Run);
        }
        if self.cur() == NL {
            return Ok(Flow::NextLine);
        }
        loop {
            self.skip_blanks();
            if self.print_quoted_string() {
                // Printed verbatim.
            } else if self.cur() == b'"' || self.cur() == b'\'' {
                return Err(Trap::Syntax);
            } else {
                self.exp_error = false;
                let value = self.expression();
                if self.exp_error {
                    return Err(Trap::InvalidExpr);
                }
                self.print_num(value as i32);
            }

            if self.cur() == b',' {
                self.txtpos += 1;
            } else if self.cur() == b';' && (self.at(1) == NL || self.at(1) == b':') {
                // Trailing semicolon suppresses the newline.
                self.txtpos += 1;
                break;
            } else if self.check_statement_end() {
                self.host.put_nl();
                break;
            } else {
                return Err(Trap::Syntax);
            }
        }
        Ok(Flow::Run)
    }

    fn two_args(&mut self) -> Result<(i16, i16), Trap> {
        self.exp_error = false;
        let first = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        self.skip_blanks();
        if self.cur() != b',' {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        self.skip_blanks();
        self.exp_error = false;
        let second = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        Ok((first, second))
    }

    fn st_poke(&mut self) -> Result<Flow, Trap> {
        let (addr, value) = self.two_args()?;
        self.host.poke(addr as u16, value as u8);
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        Ok(Flow::Run)
    }

    fn st_out(&mut self) -> Result<Flow, Trap> {
        let (port, value) = self.two_args()?;
        self.host.outp(port as u16, value as u8);
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        Ok(Flow::Run)
    }

    fn st_sleep(&mut self) -> Result<Flow, Trap> {
        self.exp_error = false;
        let ms = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        if ms > 0 {
            self.host.sleep_ms(ms as u16);
        }
        Ok(Flow::Run)
    }

    fn st_dim(&mut self) -> Result<Flow, Trap> {
        let letter = self.cur();
        if !letter.is_ascii_uppercase() {
            return Err(Trap::Syntax);
        }
        self.txtpos += 1;
        self.skip_blanks();
        if self.cur() != b'(' {
            return Err(Trap::Syntax);
        }
        // The parenthesized subscript parses as an expression atom.
        self.exp_error = false;
        let max_subscript = self.expression();
        if self.exp_error {
            return Err(Trap::InvalidExpr);
        }
        self.arena
            .dim(letter, max_subscript.wrapping_add(1) as u16)
            .map_err(|_| Trap::NoMem)?;
        if !self.check_statement_end() {
            return Err(Trap::Syntax);
        }
        Ok(Flow::Run)
    }

    fn st_list(&mut self) -> Result<Flow, Trap> {
        let from = test_num(&self.arena.mem, &mut self.txtpos);
        if self.cur() != NL {
            return Err(Trap::Syntax);
        }
        self.print_pgm(from);
        Ok(Flow::Warm)
    }

    fn st_new(&mut self) -> Result<Flow, Trap> {
        if self.cur() != NL {
            return Err(Trap::Syntax);
        }
        self.arena.pgm_end = PGM_START;
        self.arena.clear();
        Ok(Flow::Prompt)
    }

    fn st_end(&mut self) -> Result<Flow, Trap> {
        if self.cur() != NL {
            return Err(Trap::Syntax);
        }
        self.current_line = Some(self.arena.pgm_end);
        Ok(Flow::Exec)
    }

    fn st_save(&mut self) -> Result<Flow, Trap> {
        let name = self.get_quoted_string().ok_or(Trap::Syntax)?;
        if !self.host.open_write(&name) {
            return Err(Trap::Io);
        }
        self.print_pgm(0);
        self.host.close_file();
        Ok(Flow::Warm)
    }

    fn st_load(&mut self) -> Result<Flow, Trap> {
        let name = self.get_quoted_string().ok_or(Trap::Syntax)?;
        if !self.host.open_read(&name) {
            return Err(Trap::Io);
        }
        self.load_program();
        self.host.close_file();
        Ok(Flow::Warm)
    }

    /// Read lines as if typed, echo off, replacing the stored program.
    /// Stops on the first result that is not an insert or an empty line.
    pub fn load_program(&mut self) {
        let saved_echo = self.lecho;
        self.lecho = false;
        self.arena.pgm_end = PGM_START;
        loop {
            let res = self.proc_line();
            match res {
                ProcLine::Okay | ProcLine::Empty => continue,
                _ => {
                    debug!("load stopped: {res:?}");
                    break;
                }
            }
        }
        self.lecho = saved_echo;
    }

    /// Process one entered line: read it, uppercase outside quotes, parse
    /// the line number, and either hand it back for direct execution or
    /// splice it into the program store.
    fn proc_line(&mut self) -> ProcLine {
        match self.getln(None) {
            GetLine::Eof => return ProcLine::Eof,
            GetLine::Cancel => return ProcLine::Cancelled,
            GetLine::Line => {}
        }
        self.to_uppercase_buffer();

        self.txtpos = self.arena.pgm_end + 2;
        let linenum = test_num(&self.arena.mem, &mut self.txtpos);
        self.skip_blanks();
        if linenum == 0 {
            return if self.cur() == NL || self.cur() == CR {
                ProcLine::Empty
            } else {
                ProcLine::Direct
            };
        }
        if linenum == LINE_NUM_OVERFLOW {
            return ProcLine::BadLine;
        }

        let body_start = self.txtpos;
        let mut body_end = body_start;
        while self.arena.mem[body_end] != NL {
            body_end += 1;
        }
        if LINE_HDR + (body_end - body_start) + 1 > u8::MAX as usize {
            // Longer than the record length byte can describe.
            return ProcLine::BadLine;
        }
        let record = make_record(linenum, &self.arena.mem[body_start..body_end]);

        let at = self.arena.find_line(linenum);
        if at != self.arena.pgm_end && self.arena.decode_linenum(at) == linenum {
            self.arena.remove_line(at);
        }
        if body_end == body_start {
            return ProcLine::Delete;
        }
        self.arena.insert_record(at, &record);
        ProcLine::Okay
    }

    /// Uppercase the line buffer in place, leaving quoted stretches alone.
    /// The first quote character wins until its match is seen.
    fn to_uppercase_buffer(&mut self) {
        let mut at = self.arena.pgm_end + 2;
        let mut quote = 0u8;
        while self.arena.mem[at] != NL {
            let c = self.arena.mem[at];
            if c == quote {
                quote = 0;
            } else if quote == 0 && (c == b'"' || c == b'\'') {
                quote = c;
            } else if quote == 0 {
                self.arena.mem[at] = c.to_ascii_uppercase();
            }
            at += 1;
        }
    }

    /// Read one line into the buffer past the program end. Printable bytes
    /// append, backspace retracts, CR/LF/EOF terminates, Ctrl-C cancels.
    /// The buffer stops two bytes short of the control stack.
    fn getln(&mut self, prompt: Option<u8>) -> GetLine {
        if let Some(p) = prompt {
            self.host.putch(p);
        }
        let start = self.arena.pgm_end + 2;
        self.txtpos = start;
        loop {
            let c = self.host.getch();
            match c {
                EOFC if self.txtpos == start => return GetLine::Eof,
                EOFC | CR | NL => {
                    if self.lecho {
                        self.host.put_nl();
                    }
                    self.arena.mem[self.txtpos] = NL;
                    return GetLine::Line;
                }
                CTRLC => return GetLine::Cancel,
                CTRLH | DEL => {
                    if self.txtpos > start {
                        self.txtpos -= 1;
                        self.print_str(BACKSPACE_MSG);
                    }
                }
                _ => {
                    if self.txtpos == self.arena.sp - 2 {
                        self.host.putch(BELL);
                    } else {
                        self.arena.mem[self.txtpos] = c;
                        self.txtpos += 1;
                        if self.lecho {
                            self.host.putch(c);
                        }
                    }
                }
            }
        }
    }

    /// Poll for a pending Ctrl-C between statements.
    fn break_check(&mut self) -> bool {
        self.host.kbhit() && self.host.getch() == CTRLC
    }

    fn encode_line(&self) -> u16 {
        self.current_line.map_or(0, |at| at as u16)
    }

    fn decode_line(v: u16) -> Option<usize> {
        if v == 0 {
            None
        } else {
            Some(v as usize)
        }
    }

    pub(crate) fn cur(&self) -> u8 {
        self.arena.mem[self.txtpos]
    }

    pub(crate) fn at(&self, offset: usize) -> u8 {
        self.arena.mem[self.txtpos + offset]
    }

    pub(crate) fn skip_blanks(&mut self) {
        ignore_blanks(&self.arena.mem, &mut self.txtpos);
    }

    fn check_statement_end(&mut self) -> bool {
        self.skip_blanks();
        self.cur() == NL || self.cur() == b':'
    }

    fn print_str(&mut self, s: &str) {
        for b in s.bytes() {
            self.host.putch(b);
        }
    }

    pub(crate) fn print_msg(&mut self, s: &str) {
        self.print_str(s);
        self.host.put_nl();
    }

    pub(crate) fn print_num(&mut self, num: i32) {
        for b in num.to_string().into_bytes() {
            self.host.putch(b);
        }
    }

    /// Print one stored record; returns the offset of the next one.
    fn print_line(&mut self, at: usize) -> usize {
        let num = self.arena.decode_linenum(at);
        self.print_num(num as i32);
        self.host.putch(SPACE);
        let mut p = at + LINE_HDR;
        while self.arena.mem[p] != NL {
            let b = self.arena.mem[p];
            self.host.putch(b);
            p += 1;
        }
        self.host.put_nl();
        p + 1
    }

    fn print_pgm(&mut self, from: u16) {
        let mut at = self.arena.find_line(from);
        while at != self.arena.pgm_end {
            at = self.print_line(at);
        }
    }

    /// Print a quoted string at the cursor verbatim. False when the cursor
    /// is not at a quote or the closing delimiter is missing.
    fn print_quoted_string(&mut self) -> bool {
        let delim = self.cur();
        if delim != b'"' && delim != b'\'' {
            return false;
        }
        let mut probe = self.txtpos + 1;
        while self.arena.mem[probe] != delim {
            if self.arena.mem[probe] == NL {
                return false;
            }
            probe += 1;
        }
        self.txtpos += 1;
        while self.cur() != delim {
            let b = self.cur();
            self.host.putch(b);
            self.txtpos += 1;
        }
        self.txtpos += 1;
        self.skip_blanks();
        true
    }

    /// Collect a quoted string (SAVE/LOAD filename) at the cursor.
    fn get_quoted_string(&mut self) -> Option<String> {
        let delim = self.cur();
        if delim != b'"' && delim != b'\'' {
            return None;
        }
        self.txtpos += 1;
        let start = self.txtpos;
        while self.cur() != delim {
            if self.cur() == NL {
                return None;
            }
            self.txtpos += 1;
        }
        let name = String::from_utf8_lossy(&self.arena.mem[start..self.txtpos]).into_owned();
        self.txtpos += 1;
        self.skip_blanks();
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhost::ScriptHost;

    /// Feed a scripted session through the REPL and return what it printed.
    fn session(input: &str) -> String {
        let (out, _) = session_with(ScriptHost::new(), input);
        out
    }

    fn session_with(mut host: ScriptHost, input: &str) -> (String, ScriptHost) {
        host.input.extend(input.bytes());
        let mut interp = Interp::new(host, false);
        interp.run(false);
        let out = String::from_utf8_lossy(&interp.host.output).into_owned();
        (out, interp.host)
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(session("PRINT 2+3*4\n"), "OK\n14\n");
    }

    #[test]
    fn test_hex_and_mod() {
        assert_eq!(session("PRINT &HFF MOD 16\n"), "OK\n15\n");
    }

    #[test]
    fn test_lowercase_is_folded() {
        assert_eq!(session("print 1+1\n"), "OK\n2\n");
    }

    #[test]
    fn test_print_list() {
        assert_eq!(session("PRINT 1,2,3\n"), "OK\n123\n");
        assert_eq!(session("PRINT \"A\",1\n"), "OK\nA1\n");
        // Trailing semicolon suppresses the newline.
        assert_eq!(session("PRINT 5;\n"), "OK\n5");
    }

    #[test]
    fn test_print_string_case_preserved() {
        assert_eq!(session("PRINT \"Hello\"\n"), "OK\nHello\n");
        assert_eq!(session("PRINT 'lower'\n"), "OK\nlower\n");
    }

    #[test]
    fn test_bare_print() {
        // PRINT followed by newline prints nothing; PRINT : prints one.
        assert_eq!(session("PRINT\n"), "OK\n");
        assert_eq!(session("PRINT :\n"), "OK\n\n");
    }

    #[test]
    fn test_loop_and_array() {
        let input = "10 DIM A(5)\n20 FOR I=0 TO 5\n30 A(I)=I*I\n40 NEXT I\n\
                     50 FOR I=0 TO 5\n60 PRINT A(I)\n70 NEXT I\nRUN\n";
        assert_eq!(session(input), "OK\n0\n1\n4\n9\n16\n25\nOK\n");
    }

    #[test]
    fn test_gosub_return() {
        let input = "10 GOSUB 100\n20 PRINT \"DONE\"\n30 END\n\
                     100 PRINT \"SUB\"\n110 RETURN\nRUN\n";
        assert_eq!(session(input), "OK\nSUB\nDONE\nOK\n");
    }

    #[test]
    fn test_relational_prints() {
        assert_eq!(session("PRINT 5>=5\n"), "OK\n1\n");
        assert_eq!(session("PRINT 5<>5\n"), "OK\n0\n");
    }

    #[test]
    fn test_edit_then_list() {
        let out = session("10 PRINT 1\n10 PRINT 2\nLIST\n");
        assert_eq!(out, "OK\n10 PRINT 2\nOK\n");
    }

    #[test]
    fn test_delete_line() {
        let out = session("10 PRINT 1\n20 PRINT 2\n10\nLIST\n");
        assert_eq!(out, "OK\n20 PRINT 2\nOK\n");
    }

    #[test]
    fn test_list_from_line() {
        let out = session("10 PRINT 1\n20 PRINT 2\nLIST 20\n");
        assert_eq!(out, "OK\n20 PRINT 2\nOK\n");
    }

    #[test]
    fn test_bad_line_number() {
        assert_eq!(session("65001 PRINT 1\n"), "OK\nInvalid line number\n");
        // 65000 is the largest stored line number.
        let out = session("65000 PRINT 1\nLIST\n");
        assert_eq!(out, "OK\n65000 PRINT 1\nOK\n");
    }

    #[test]
    fn test_if_true_continues_line() {
        assert_eq!(session("IF 1 PRINT 5\n"), "OK\n5\n");
        assert_eq!(
            session("10 IF 0 PRINT 5\n20 PRINT 6\nRUN\n"),
            "OK\n6\nOK\n"
        );
    }

    #[test]
    fn test_goto_direct() {
        let input = "10 PRINT 7\n20 END\nGOTO 10\n";
        assert_eq!(session(input), "OK\n7\nOK\n");
    }

    #[test]
    fn test_for_runs_body_once_even_when_done() {
        // The loop test happens only at NEXT.
        let input = "10 FOR I=1 TO 0\n20 PRINT I\n30 NEXT I\nRUN\n";
        assert_eq!(session(input), "OK\n1\nOK\n");
    }

    #[test]
    fn test_for_with_step() {
        let input = "10 FOR I=10 TO 1 STEP -3\n20 PRINT I\n30 NEXT I\nRUN\n";
        assert_eq!(session(input), "OK\n10\n7\n4\n1\nOK\n");
    }

    #[test]
    fn test_nested_for() {
        let input = "10 FOR I=1 TO 2\n20 FOR J=1 TO 2\n30 PRINT I*10+J\n\
                     40 NEXT J\n50 NEXT I\nRUN\n";
        assert_eq!(session(input), "OK\n11\n12\n21\n22\nOK\n");
    }

    #[test]
    fn test_next_without_for_is_syntax_error() {
        let out = session("10 NEXT I\nRUN\n");
        assert!(out.contains("Syntax Error"));
    }

    #[test]
    fn test_return_pops_inner_for_frames() {
        // Leaving a FOR loop by RETURN abandons its frame; the outer
        // gosub frame is still found.
        let input = "10 GOSUB 100\n20 PRINT \"OUT\"\n30 END\n\
                     100 FOR I=1 TO 10\n110 RETURN\nRUN\n";
        assert_eq!(session(input), "OK\nOUT\nOK\n");
    }

    #[test]
    fn test_input_parses_negative() {
        let host = ScriptHost::new();
        let input = "10 INPUT A\n20 PRINT A\nRUN\n-42\n";
        let (out, _) = session_with(host, input);
        assert_eq!(out, "OK\n?-42\nOK\n");
    }

    #[test]
    fn test_input_reprompts_on_bad_number() {
        let input = "10 INPUT A\n20 PRINT A\nRUN\nabc\n5\n";
        let (out, _) = session_with(ScriptHost::new(), input);
        assert_eq!(out, "OK\n?\nBad number\n?5\nOK\n");
    }

    #[test]
    fn test_input_then_statement_on_same_line() {
        let input = "10 INPUT A: PRINT A+1\nRUN\n9\n";
        let (out, _) = session_with(ScriptHost::new(), input);
        assert_eq!(out, "OK\n?10\nOK\n");
    }

    #[test]
    fn test_assignment_forms() {
        assert_eq!(session("LET A=5\nPRINT A\n"), "OK\n5\n");
        assert_eq!(session("A=6\nPRINT A\n"), "OK\n6\n");
        assert_eq!(session("DIM B(2)\nB(1)=9\nPRINT B(1)\n"), "OK\n9\n");
    }

    #[test]
    fn test_scalar_and_array_namespaces() {
        let out = session("A=1\nDIM A(3)\nA(0)=2\nPRINT A\nPRINT A(0)\n");
        assert_eq!(out, "OK\n1\n2\n");
    }

    #[test]
    fn test_dim_zero_bounds() {
        let out = session("DIM A(0)\nA(0)=3\nPRINT A(0)\nPRINT A(1)\n");
        assert_eq!(out, "OK\n3\nBounds error\nInvalid expression\n");
    }

    #[test]
    fn test_clear_zeroes_state() {
        let out = session("A=5\nCLEAR\nPRINT A\n");
        assert_eq!(out, "OK\n0\n");
    }

    #[test]
    fn test_new_discards_program() {
        let out = session("10 PRINT 1\nNEW\nLIST\n");
        assert_eq!(out, "OK\nOK\n");
    }

    #[test]
    fn test_stop_prints_break() {
        let out = session("10 PRINT 1\n20 STOP\n30 PRINT 2\nRUN\n");
        assert_eq!(out, "OK\n1\nbreak!\nOK\n");
    }

    #[test]
    fn test_end_is_silent() {
        let out = session("10 PRINT 1\n20 END\n30 PRINT 2\nRUN\n");
        assert_eq!(out, "OK\n1\nOK\n");
    }

    #[test]
    fn test_trailing_bytes_after_bare_keywords() {
        assert!(session("NEW 1\n").contains("Syntax Error"));
        assert!(session("10 END 1\nRUN\n").contains("Syntax Error"));
        assert!(session("LIST X\n").contains("Syntax Error"));
    }

    #[test]
    fn test_syntax_error_prints_caret() {
        let out = session("10 PRINT 1 @\nRUN\n");
        assert!(out.contains("Syntax Error"));
        assert!(out.contains("10 PRINT 1 ^"));
    }

    #[test]
    fn test_break_key_interrupts_program() {
        let out = session("10 GOTO 10\nRUN\n\u{3}");
        assert_eq!(out, "OK\nbreak!\nOK\n");
    }

    #[test]
    fn test_poke_peek_round_trip() {
        let out = session("POKE 100, 55\nPRINT PEEK(100)\n");
        assert_eq!(out, "OK\n55\n");
    }

    #[test]
    fn test_out_reaches_host() {
        let (out, host) = session_with(ScriptHost::new(), "OUT 3, 9\n");
        assert_eq!(out, "OK\n");
        assert_eq!(host.ports, vec![(3, 9)]);
    }

    #[test]
    fn test_sleep_delegates_to_host() {
        let (_, host) = session_with(ScriptHost::new(), "SLEEP 50\n");
        assert_eq!(host.slept, vec![50]);
    }

    #[test]
    fn test_save_writes_listing_bytes() {
        let input = "10 PRINT 1\n20 PRINT 2\nSAVE \"P\"\n";
        let (_, host) = session_with(ScriptHost::new(), input);
        assert_eq!(
            host.files.get("P").map(Vec::as_slice),
            Some(&b"10 PRINT 1\n20 PRINT 2\n"[..])
        );
    }

    #[test]
    fn test_save_new_load_round_trips() {
        let input = "10 PRINT 1\n20 PRINT 2\nSAVE \"P\"\nNEW\nLOAD \"P\"\nLIST\n";
        let (out, _) = session_with(ScriptHost::new(), input);
        assert_eq!(out, "OK\nOK\nOK\n10 PRINT 1\n20 PRINT 2\nOK\n");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let out = session("LOAD \"NOPE\"\n");
        assert_eq!(out, "OK\nIO Error\n");
    }

    #[test]
    fn test_load_leaves_variables_alone() {
        let mut host = ScriptHost::new();
        host.files.insert("P".into(), b"10 PRINT A\n".to_vec());
        let (out, _) = session_with(host, "A=7\nLOAD \"P\"\nRUN\n");
        assert_eq!(out, "OK\nOK\n7\nOK\n");
    }

    #[test]
    fn test_gosub_without_return_then_return_direct() {
        // RETURN in direct mode with an empty stack is a syntax error.
        let out = session("RETURN\n");
        assert!(out.contains("Syntax Error"));
    }

    #[test]
    fn test_ctrl_c_cancels_entry() {
        // The partial line is discarded; the next one still works.
        let out = session("PRINT 1\u{3}PRINT 2\n");
        assert_eq!(out, "OK\n2\n");
    }

    #[test]
    fn test_run_empty_program() {
        assert_eq!(session("RUN\n"), "OK\nOK\n");
    }

    #[test]
    fn test_goto_missing_line_stops_cleanly() {
        // findline lands on the program end: clean warmstart.
        let out = session("10 GOTO 100\nRUN\n");
        assert_eq!(out, "OK\nOK\n");
    }

    #[test]
    fn test_statement_chaining_with_colon() {
        assert_eq!(session("A=1: PRINT A: PRINT A+1\n"), "OK\n1\n2\n");
    }

    #[test]
    fn test_rem_ignores_rest() {
        let out = session("10 REM NOTHING: PRINT 9\n20 PRINT 1\nRUN\n");
        assert_eq!(out, "OK\n1\nOK\n");
    }

    #[test]
    fn test_banner_reports_free_bytes() {
        let mut host = ScriptHost::new();
        host.input.extend(b"BYE\n");
        let mut interp = Interp::new(host, false);
        interp.banner();
        interp.run(false);
        let out = String::from_utf8_lossy(&interp.host.output).into_owned();
        assert_eq!(out, "Not-So-Tiny BASIC\n32612 bytes free.\nOK\n");
    }

    #[test]
    fn test_bye_exits() {
        assert_eq!(session("BYE\nPRINT 1\n"), "OK\n");
        assert_eq!(session("SYSTEM\nPRINT 1\n"), "OK\n");
    }
}
