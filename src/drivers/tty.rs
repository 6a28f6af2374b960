//! Terminals: the line discipline and a terminal device around it.
//!
//! The discipline keeps a circular input buffer with three indices:
//! the read head (where consumers are), the cooked tail (how far
//! consumers may read) and the raw tail (how far the driver has
//! written). Newlines and end-of-file cook the raw region and wake
//! blocked readers; backspace retracts the raw tail but never past the
//! cooked tail; input into a full buffer is dropped.

use alloc::sync::Arc;
use alloc::vec::Vec;
use arrayvec::ArrayVec;

use crate::error::Result;
use crate::hal::WaitQueue;
use crate::lock::SpinLock;
use crate::param::TTY_BUF_SIZE;

use super::CharDevice;

const EOFC: u8 = 0x04;

fn is_newline(ch: u8) -> bool {
    ch == b'\n' || ch == b'\r'
}

fn is_backspace(ch: u8) -> bool {
    ch == 0x08 || ch == 0x7f
}

/// What the driver should echo back for one received character.
pub type Echo = ArrayVec<u8, 4>;

struct LdInner {
    buf: [u8; TTY_BUF_SIZE],
    rhead: usize,
    ckdtail: usize,
    rawtail: usize,
}

impl LdInner {
    fn next(idx: usize) -> usize {
        (idx + 1) % TTY_BUF_SIZE
    }

    fn prev(idx: usize) -> usize {
        (idx + TTY_BUF_SIZE - 1) % TTY_BUF_SIZE
    }

    fn full(&self) -> bool {
        Self::next(self.rawtail) == self.rhead
    }
}

pub struct LineDiscipline {
    inner: SpinLock<LdInner>,
    waitq: Arc<dyn WaitQueue>,
}

impl LineDiscipline {
    pub fn new(waitq: Arc<dyn WaitQueue>) -> Self {
        Self {
            inner: SpinLock::new(LdInner {
                buf: [0; TTY_BUF_SIZE],
                rhead: 0,
                ckdtail: 0,
                rawtail: 0,
            }),
            waitq,
        }
    }

    /// The driver received `ch`. Returns what to echo.
    pub fn receive_char(&self, ch: u8) -> Echo {
        let mut ld = self.inner.lock();
        let mut echo = Echo::new();

        if is_backspace(ch) {
            // Never erase past what is already cooked.
            if ld.rawtail != ld.ckdtail {
                ld.rawtail = LdInner::prev(ld.rawtail);
                echo.try_extend_from_slice(b"\x08 \x08").expect("echo fits");
            }
            return echo;
        }
        if ld.full() {
            // Drop input on the floor; there is nowhere to put it.
            return echo;
        }

        let rawtail = ld.rawtail;
        ld.buf[rawtail] = ch;
        ld.rawtail = LdInner::next(rawtail);

        if is_newline(ch) || ch == EOFC {
            ld.ckdtail = ld.rawtail;
            echo.try_extend_from_slice(b"\n\r").expect("echo fits");
            drop(ld);
            self.waitq.wake_all();
        } else {
            echo.push(ch);
        }
        echo
    }

    /// Read cooked bytes: up to and including the first newline, or up
    /// to `buf.len()`. Blocks until something is cooked; an end-of-file
    /// at the head consumes it and reads as zero bytes.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut ld = self.inner.lock();
                if ld.rhead != ld.ckdtail {
                    let mut n = 0;
                    while n < buf.len() && ld.rhead != ld.ckdtail {
                        let ch = ld.buf[ld.rhead];
                        ld.rhead = LdInner::next(ld.rhead);
                        if ch == EOFC {
                            return Ok(n);
                        }
                        // '\r' cooks like a newline and reads as one.
                        buf[n] = if is_newline(ch) { b'\n' } else { ch };
                        n += 1;
                        if is_newline(ch) {
                            break;
                        }
                    }
                    return Ok(n);
                }
            }
            self.waitq.sleep()?;
        }
    }
}

/// A terminal: the line discipline on the input side, an output
/// buffer standing in for the screen.
pub struct Tty {
    ldisc: LineDiscipline,
    out: SpinLock<Vec<u8>>,
}

impl Tty {
    pub fn new(waitq: Arc<dyn WaitQueue>) -> Arc<Self> {
        Arc::new(Self {
            ldisc: LineDiscipline::new(waitq),
            out: SpinLock::new(Vec::new()),
        })
    }

    /// Feed one keystroke from the hardware side.
    pub fn input(&self, ch: u8) {
        let echo = self.ldisc.receive_char(ch);
        self.out.lock().extend_from_slice(&echo);
    }

    pub fn input_str(&self, bytes: &[u8]) {
        for ch in bytes {
            self.input(*ch);
        }
    }

    /// Everything echoed or written so far.
    pub fn output(&self) -> Vec<u8> {
        self.out.lock().clone()
    }
}

impl CharDevice for Tty {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.ldisc.read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut out = self.out.lock();
        for ch in buf {
            if is_newline(*ch) {
                out.extend_from_slice(b"\n\r");
            } else {
                out.push(*ch);
            }
        }
        Ok(buf.len())
    }
}
