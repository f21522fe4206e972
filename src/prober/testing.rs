//! In-memory channel and readiness doubles. Each counts its drops so tests
//! can check the "closed exactly once" property on every exit path.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddrV4;
use std::rc::Rc;
use std::time::Duration;

use crate::channel::{DatagramChannel, Readiness};

pub(crate) struct ScriptedChannel {
    script: RefCell<VecDeque<io::Result<Vec<u8>>>>,
    pub sent: Rc<RefCell<Vec<(Vec<u8>, SocketAddrV4)>>>,
    pub reads: Rc<Cell<usize>>,
    pub send_error: Option<i32>,
    drops: Rc<Cell<usize>>,
}

impl ScriptedChannel {
    pub fn new(script: Vec<io::Result<Vec<u8>>>) -> (Self, Rc<Cell<usize>>) {
        let drops = Rc::new(Cell::new(0));
        let channel = ScriptedChannel {
            script: RefCell::new(script.into()),
            sent: Rc::default(),
            reads: Rc::default(),
            send_error: None,
            drops: drops.clone(),
        };
        (channel, drops)
    }

    fn next(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.set(self.reads.get() + 1);
        // an exhausted script behaves like a socket whose timeout fired
        let datagram = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::from_raw_os_error(libc::EAGAIN)))?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}

impl DatagramChannel for ScriptedChannel {
    fn send_to(&self, bytes: &[u8], destination: SocketAddrV4) -> io::Result<usize> {
        if let Some(errno) = self.send_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.sent.borrow_mut().push((bytes.to_vec(), destination));
        Ok(bytes.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddrV4>)> {
        Ok((self.next(buf)?, None))
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.next(buf)
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

pub(crate) struct ScriptedReadiness {
    script: VecDeque<io::Result<usize>>,
    pub timeouts: Rc<RefCell<Vec<Duration>>>,
    drops: Rc<Cell<usize>>,
}

impl ScriptedReadiness {
    pub fn new(script: Vec<io::Result<usize>>) -> (Self, Rc<Cell<usize>>) {
        let drops = Rc::new(Cell::new(0));
        let readiness = ScriptedReadiness {
            script: script.into(),
            timeouts: Rc::default(),
            drops: drops.clone(),
        };
        (readiness, drops)
    }
}

impl Readiness for ScriptedReadiness {
    fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        self.timeouts.borrow_mut().push(timeout);
        self.script.pop_front().unwrap_or(Ok(0))
    }
}

impl Drop for ScriptedReadiness {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
