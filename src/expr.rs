//! Expression evaluator for Not-So-Tiny BASIC
//!
//! Four mutually recursive levels over raw line bytes: relational, additive,
//! multiplicative, atoms. All arithmetic is signed 16-bit two's complement
//! with wraparound. Failures set the shared error flag and evaluation keeps
//! consuming to a well-defined cursor position, so the statement layer can
//! report the offending column.

use crate::host::Host;
use crate::interp::Interp;
use crate::scan::{
    scan_table, FUNC_ABS, FUNC_FRE, FUNC_HIGH, FUNC_INP, FUNC_LOW, FUNC_PEEK, FUNC_RAND,
    FUNC_UNKNOWN, FUNCTIONS, RELOPS, RELOP_EQ, RELOP_GE, RELOP_GT, RELOP_LE, RELOP_NE,
    RELOP_UNKNOWN,
};

pub(crate) const BOUNDS_MSG: &str = "Bounds error";

impl<H: Host> Interp<H> {
    /// Level 1: an additive operand, optionally compared against a second.
    /// A relation yields 1 or 0; relationals do not chain.
    pub(crate) fn expression(&mut self) -> i16 {
        let a = self.expr2();
        if self.exp_error {
            return a;
        }
        let relop = scan_table(&self.arena.mem, &mut self.txtpos, RELOPS);
        if relop == RELOP_UNKNOWN {
            return a;
        }
        let b = self.expr2();
        let holds = match relop {
            RELOP_GE => a >= b,
            RELOP_NE => a != b,
            RELOP_GT => a > b,
            RELOP_EQ => a == b,
            RELOP_LE => a <= b,
            _ => a < b,
        };
        holds as i16
    }

    /// Level 2: left-associative `+`/`-`, with a unary sign taken as a
    /// zero left operand.
    fn expr2(&mut self) -> i16 {
        let mut a = if self.cur() == b'-' || self.cur() == b'+' {
            0
        } else {
            self.expr3()
        };
        loop {
            match self.cur() {
                b'-' => {
                    self.txtpos += 1;
                    let b = self.expr3();
                    a = a.wrapping_sub(b);
                }
                b'+' => {
                    self.txtpos += 1;
                    let b = self.expr3();
                    a = a.wrapping_add(b);
                }
                _ => return a,
            }
        }
    }

    /// Level 3: left-associative `*`, `/` and `MOD`. A zero divisor sets
    /// the error flag; parsing continues.
    fn expr3(&mut self) -> i16 {
        let mut a = self.expr4();
        loop {
            if self.cur() == b'*' {
                self.txtpos += 1;
                let b = self.expr4();
                a = a.wrapping_mul(b);
            } else if self.cur() == b'/' {
                self.txtpos += 1;
                let b = self.expr4();
                if b != 0 {
                    a = a.wrapping_div(b);
                } else {
                    self.exp_error = true;
                }
            } else if self.cur() == b'M' && self.at(1) == b'O' && self.at(2) == b'D' {
                self.txtpos += 3;
                let b = self.expr4();
                if b != 0 {
                    a = a.wrapping_rem(b);
                } else {
                    self.exp_error = true;
                }
            } else {
                return a;
            }
        }
    }

    /// Level 4: literals, variable and array loads, functions, and
    /// parenthesized sub-expressions.
    fn expr4(&mut self) -> i16 {
        let a = self.atom();
        self.skip_blanks();
        a
    }

    fn atom(&mut self) -> i16 {
        self.skip_blanks();
        let c = self.cur();

        if c == b'0' {
            self.txtpos += 1;
            return 0;
        }

        if (b'1'..=b'9').contains(&c) {
            let mut a: i16 = 0;
            while self.cur().is_ascii_digit() {
                a = a.wrapping_mul(10).wrapping_add((self.cur() - b'0') as i16);
                self.txtpos += 1;
            }
            return a;
        }

        // Hex literal: `&` then `H` or `h`, then one or more hex digits.
        if c == b'&' && (self.at(1) == b'H' || self.at(1) == b'h') {
            self.txtpos += 2;
            let mut a: i16 = 0;
            let mut any = false;
            loop {
                let d = match self.cur() {
                    d @ b'0'..=b'9' => d - b'0',
                    d @ b'a'..=b'f' => d - b'a' + 10,
                    d @ b'A'..=b'F' => d - b'A' + 10,
                    _ => break,
                };
                a = a.wrapping_mul(16).wrapping_add(d as i16);
                any = true;
                self.txtpos += 1;
            }
            if !any {
                self.exp_error = true;
            }
            return a;
        }

        if c.is_ascii_uppercase() {
            // Array load.
            if self.at(1) == b'(' {
                self.txtpos += 2;
                let index = self.expression();
                if self.cur() != b')' {
                    self.exp_error = true;
                    return 0;
                }
                self.txtpos += 1;
                return match self.arena.array_get(c, index) {
                    Some(v) => v,
                    None => {
                        self.print_msg(BOUNDS_MSG);
                        self.exp_error = true;
                        0
                    }
                };
            }

            // Variable load: a single letter not followed by another.
            if !self.at(1).is_ascii_uppercase() {
                self.txtpos += 1;
                return self.arena.var_get(c);
            }

            return self.function();
        }

        if c == b'(' {
            self.txtpos += 1;
            let a = self.expression();
            if self.cur() != b')' {
                self.exp_error = true;
                return a;
            }
            self.txtpos += 1;
            return a;
        }

        self.exp_error = true;
        0
    }

    fn function(&mut self) -> i16 {
        let f = scan_table(&self.arena.mem, &mut self.txtpos, FUNCTIONS);
        if f == FUNC_UNKNOWN {
            self.exp_error = true;
            return 0;
        }

        // HIGH and LOW take no arguments.
        if f == FUNC_HIGH {
            return 1;
        }
        if f == FUNC_LOW {
            return 0;
        }

        if self.cur() != b'(' {
            self.exp_error = true;
            return 0;
        }
        self.txtpos += 1;
        let a = self.expression();
        if self.cur() != b')' {
            self.exp_error = true;
            return a;
        }
        self.txtpos += 1;

        match f {
            FUNC_PEEK => self.host.peek(a as u16) as i16,
            FUNC_ABS => a.wrapping_abs(),
            FUNC_INP => self.host.inp(a as u16) as i16,
            FUNC_FRE => (self.arena.sp - self.arena.pgm_end) as i16,
            FUNC_RAND => self.host.rand(a as u16) as i16,
            _ => a,
        }
    }
}
