//! Scripted protocol client for controller and supervisor tests

use super::client::{ExceptionResponse, ProtocolClient, Reply};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the mock answers one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Slave acknowledges
    Ack,
    /// Slave answers with an exception response
    Exception,
    /// Transport fault (timeout, broken pipe)
    Fault,
    /// The client itself panics mid-request
    Panic,
}

/// A request the mock saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Read { address: u16, count: u16, unit: u8 },
    WriteRegister { address: u16, value: u16, unit: u8 },
    WriteCoil { address: u16, value: bool, unit: u8 },
    Close,
}

#[derive(Debug)]
struct Script {
    connect_ok: bool,
    connect_delay: Duration,
    probe: Step,
    registers: VecDeque<Step>,
    coils: VecDeque<Step>,
    connected: bool,
    calls: Vec<Call>,
}

/// Protocol client that answers from per-request scripts. Writes past the end
/// of a script are acknowledged. Clones share the same script and call log.
#[derive(Debug, Clone)]
pub struct ScriptedClient {
    inner: Arc<Mutex<Script>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                connect_ok: true,
                connect_delay: Duration::ZERO,
                probe: Step::Ack,
                registers: VecDeque::new(),
                coils: VecDeque::new(),
                connected: false,
                calls: Vec::new(),
            })),
        }
    }

    pub fn refuse_connect(self) -> Self {
        self.inner.lock().unwrap().connect_ok = false;
        self
    }

    /// Make opening the session take this long
    pub fn slow_connect(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().connect_delay = delay;
        self
    }

    pub fn probe(self, step: Step) -> Self {
        self.inner.lock().unwrap().probe = step;
        self
    }

    pub fn registers(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.inner.lock().unwrap().registers.extend(steps);
        self
    }

    pub fn coils(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.inner.lock().unwrap().coils.extend(steps);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Requests that reached the transport (reads and writes)
    pub fn transport_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::Connect | Call::Close))
            .count()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn answer<T>(&self, call: Call, step: Step, value: T) -> Result<Reply<T>> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push(call);
        if !script.connected {
            return Err(anyhow!("session is not open"));
        }
        if step == Step::Panic {
            // release the lock so the script is not poisoned
            drop(script);
            panic!("scripted client panic");
        }
        match step {
            Step::Ack => Ok(Ok(value)),
            Step::Exception => Ok(Err(ExceptionResponse::new("IllegalDataAddress"))),
            Step::Fault | Step::Panic => Err(anyhow!("no response within 3s")),
        }
    }

    fn next_register(&self) -> Step {
        self.inner.lock().unwrap().registers.pop_front().unwrap_or(Step::Ack)
    }

    fn next_coil(&self) -> Step {
        self.inner.lock().unwrap().coils.pop_front().unwrap_or(Step::Ack)
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn connect(&mut self) -> Result<()> {
        let delay = self.inner.lock().unwrap().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.inner.lock().unwrap();
        script.calls.push(Call::Connect);
        if !script.connect_ok {
            return Err(anyhow!("could not open port"));
        }
        script.connected = true;
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Reply<Vec<u16>>> {
        let step = self.inner.lock().unwrap().probe;
        self.answer(Call::Read { address, count, unit }, step, vec![0; count as usize])
    }

    async fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<Reply<()>> {
        let step = self.next_register();
        self.answer(Call::WriteRegister { address, value, unit }, step, ())
    }

    async fn write_coil(&mut self, address: u16, value: bool, unit: u8) -> Result<Reply<()>> {
        let step = self.next_coil();
        self.answer(Call::WriteCoil { address, value, unit }, step, ())
    }

    async fn close(&mut self) {
        let mut script = self.inner.lock().unwrap();
        script.calls.push(Call::Close);
        script.connected = false;
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
