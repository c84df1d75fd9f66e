//! In-memory `tokio-modbus` client backing the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_modbus::client::{Client, Context};
use tokio_modbus::slave::SlaveContext;
use tokio_modbus::{Request, Response, Slave};

/// Register and coil store shared between a test and its [`BankClient`]s.
#[derive(Debug, Default)]
pub(crate) struct Bank {
    pub registers: HashMap<u16, u16>,
    pub coils: HashMap<u16, bool>,
    pub discrete_inputs: HashMap<u16, bool>,
    /// Total transport calls answered.
    pub call_count: usize,
    /// Peak number of concurrently executing transport calls; stays at 1 when
    /// access is properly serialized.
    pub max_active_calls: usize,
    active_calls: usize,
}

pub(crate) type SharedBank = Arc<Mutex<Bank>>;

/// An in-memory device that answers requests from a [`Bank`], optionally
/// after a delay (to widen race windows) or never (to exercise deadlines).
#[derive(Debug)]
pub(crate) struct BankClient {
    bank: SharedBank,
    call_delay: Duration,
    hang: bool,
}

impl BankClient {
    pub fn new(bank: SharedBank) -> Self {
        Self {
            bank,
            call_delay: Duration::ZERO,
            hang: false,
        }
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn into_context(self) -> Context {
        Context::from(Box::new(self) as Box<dyn Client>)
    }
}

impl SlaveContext for BankClient {
    fn set_slave(&mut self, _slave: Slave) {}
}

#[async_trait::async_trait]
impl Client for BankClient {
    async fn call(&mut self, request: Request<'_>) -> tokio_modbus::Result<Response> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        {
            let mut bank = self.bank.lock().unwrap();
            bank.call_count += 1;
            bank.active_calls += 1;
            bank.max_active_calls = bank.max_active_calls.max(bank.active_calls);
        }
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        let mut bank = self.bank.lock().unwrap();
        bank.active_calls -= 1;
        let response = match request {
            Request::ReadCoils(addr, cnt) => Response::ReadCoils(
                (0..cnt)
                    .map(|i| *bank.coils.get(&(addr + i)).unwrap_or(&false))
                    .collect(),
            ),
            Request::ReadDiscreteInputs(addr, cnt) => Response::ReadDiscreteInputs(
                (0..cnt)
                    .map(|i| *bank.discrete_inputs.get(&(addr + i)).unwrap_or(&false))
                    .collect(),
            ),
            Request::WriteSingleCoil(addr, value) => {
                bank.coils.insert(addr, value);
                Response::WriteSingleCoil(addr, value)
            }
            Request::ReadHoldingRegisters(addr, cnt) => Response::ReadHoldingRegisters(
                (0..cnt)
                    .map(|i| *bank.registers.get(&(addr + i)).unwrap_or(&0))
                    .collect(),
            ),
            Request::ReadInputRegisters(addr, cnt) => Response::ReadInputRegisters(
                (0..cnt)
                    .map(|i| *bank.registers.get(&(addr + i)).unwrap_or(&0))
                    .collect(),
            ),
            Request::WriteMultipleRegisters(addr, words) => {
                for (i, word) in words.iter().enumerate() {
                    bank.registers.insert(addr + i as u16, *word);
                }
                Response::WriteMultipleRegisters(addr, words.len() as u16)
            }
            other => unimplemented!("request not supported by the test bank: {other:?}"),
        };
        Ok(Ok(response))
    }

    async fn disconnect(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
