//! Outstanding confirmed requests, keyed by invoke ID.

use crate::{ClientError, DeviceAddress, TableError};
use bacflow_core::codec::ConfirmedService;
use bacflow_core::services::{ReadPropertyAck, ReadPropertyMultipleAck};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

const INVOKE_ID_SPACE: usize = 256;

/// Successful answer to a confirmed request.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    SimpleAck,
    ReadProperty(ReadPropertyAck),
    ReadPropertyMultiple(ReadPropertyMultipleAck),
}

pub type Outcome = Result<ServiceResponse, ClientError>;

/// Single-assignment slot a caller waits on.
pub type ResultSlot = oneshot::Sender<Outcome>;

#[derive(Debug)]
pub struct Transaction {
    pub invoke_id: u8,
    pub service: ConfirmedService,
    pub destination: DeviceAddress,
    pub deadline: Instant,
    pub retries_remaining: u8,
    /// Encoded request, resent unchanged on retry.
    pub frame: Vec<u8>,
    slot: ResultSlot,
}

impl Transaction {
    /// Fills the result slot. Returns `false` if the caller stopped waiting.
    pub fn complete(self, outcome: Outcome) -> bool {
        self.slot.send(outcome).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct TransactionTable {
    entries: HashMap<u8, Transaction>,
    next_id: u8,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transaction under the next free invoke ID.
    ///
    /// IDs rotate modulo 256 and skip the ones still outstanding. When all
    /// 256 are in use the slot is completed with
    /// [`ClientError::TableExhausted`] right away.
    pub fn allocate(
        &mut self,
        service: ConfirmedService,
        destination: DeviceAddress,
        deadline: Instant,
        retries: u8,
        slot: ResultSlot,
    ) -> Result<u8, TableError> {
        if self.entries.len() >= INVOKE_ID_SPACE {
            let _ = slot.send(Err(ClientError::TableExhausted));
            return Err(TableError::Exhausted);
        }
        let mut invoke_id = self.next_id;
        while self.entries.contains_key(&invoke_id) {
            invoke_id = invoke_id.wrapping_add(1);
        }
        self.next_id = invoke_id.wrapping_add(1);
        self.entries.insert(
            invoke_id,
            Transaction {
                invoke_id,
                service,
                destination,
                deadline,
                retries_remaining: retries,
                frame: Vec::new(),
                slot,
            },
        );
        Ok(invoke_id)
    }

    pub fn attach_frame(&mut self, invoke_id: u8, frame: Vec<u8>) -> Result<(), TableError> {
        let entry = self
            .entries
            .get_mut(&invoke_id)
            .ok_or(TableError::NotFound(invoke_id))?;
        entry.frame = frame;
        Ok(())
    }

    pub fn service_of(&self, invoke_id: u8) -> Option<ConfirmedService> {
        self.entries.get(&invoke_id).map(|t| t.service)
    }

    /// Removes the transaction and hands `outcome` to its waiter.
    ///
    /// `NotFound` is the normal result for duplicate and late responses and
    /// leaves the table untouched.
    pub fn resolve(&mut self, invoke_id: u8, outcome: Outcome) -> Result<(), TableError> {
        let txn = self
            .entries
            .remove(&invoke_id)
            .ok_or(TableError::NotFound(invoke_id))?;
        if !txn.complete(outcome) {
            log::debug!("caller for invoke id {invoke_id} went away before its result");
        }
        Ok(())
    }

    /// Removes and returns every transaction whose deadline is at or before
    /// `now`, earliest first.
    pub fn expire_due(&mut self, now: Instant) -> Vec<Transaction> {
        let due: Vec<u8> = self
            .entries
            .values()
            .filter(|t| t.deadline <= now)
            .map(|t| t.invoke_id)
            .collect();
        let mut expired: Vec<Transaction> = due
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect();
        expired.sort_by_key(|t| t.deadline);
        expired
    }

    /// Puts a retried transaction back under its own invoke ID.
    ///
    /// If that ID has been taken in the meantime the transaction is failed
    /// instead of overwriting the other entry.
    pub fn reschedule(&mut self, txn: Transaction) -> Result<(), TableError> {
        let invoke_id = txn.invoke_id;
        if self.entries.contains_key(&invoke_id) {
            let err = TableError::InvokeIdInUse(invoke_id);
            txn.complete(Err(err.into()));
            return Err(err);
        }
        self.entries.insert(invoke_id, txn);
        Ok(())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|t| t.deadline).min()
    }

    /// Fails every outstanding transaction with the error `make_err` builds.
    pub fn cancel_all(&mut self, make_err: impl Fn() -> ClientError) -> usize {
        let count = self.entries.len();
        for (_, txn) in self.entries.drain() {
            txn.complete(Err(make_err()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
