//! Recording test doubles for the registry and transport traits.

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use autobaud::{Error, PortInfo, PortRegistry, Result, SerialSession, SerialTransport};

/// Registry returning a fixed port list.
pub struct FixedRegistry(pub Vec<PortInfo>);

impl PortRegistry for FixedRegistry {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.0.clone())
    }
}

pub fn port(name: &str, manufacturer: &str) -> PortInfo {
    PortInfo {
        name: name.to_string(),
        manufacturer: Some(manufacturer.to_string()),
        ..PortInfo::default()
    }
}

/// Transport that answers only on one (path, rate) and garbles everything else.
pub struct ScriptedTransport {
    accept: (String, u32),
    pub opened: Arc<Mutex<Vec<(String, u32)>>>,
    pub closed: Arc<Mutex<usize>>,
    pub on_open: Box<dyn Fn(usize) + Send + Sync>,
}

impl ScriptedTransport {
    pub fn accepting(path: &str, rate: u32) -> Self {
        Self {
            accept: (path.to_string(), rate),
            opened: Arc::default(),
            closed: Arc::default(),
            on_open: Box::new(|_| {}),
        }
    }

    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }
}

pub struct ScriptedSession {
    accepted: bool,
    closed: Arc<Mutex<usize>>,
}

impl SerialTransport for ScriptedTransport {
    type Session = ScriptedSession;

    fn open(&self, path: &str, baud_rate: u32, _timeout: Duration) -> Result<ScriptedSession> {
        if path.is_empty() {
            return Err(Error::Transport("empty path".to_string()));
        }
        let count = {
            let mut opened = self.opened.lock().unwrap();
            opened.push((path.to_string(), baud_rate));
            opened.len()
        };
        (self.on_open)(count);

        Ok(ScriptedSession {
            accepted: self.accept.0 == path && self.accept.1 == baud_rate,
            closed: Arc::clone(&self.closed),
        })
    }
}

impl SerialSession for ScriptedSession {
    fn write_all_bytes(&mut self, _buf: &[u8]) -> Result<()> {
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        if self.accepted {
            Ok(b"ok\n".to_vec())
        } else {
            Ok(vec![0xF0, 0x9F, 0x00])
        }
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock().unwrap() += 1;
        Ok(())
    }
}
