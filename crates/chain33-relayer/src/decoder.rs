//! Maps bridge-bank logs to [`DomainEvent`]s.

use crate::{
    error::DecodeError,
    types::{BurnEvent, DomainEvent, LockEvent},
};
use ethers::{
    abi::{self, Event, ParamType, Token},
    types::{Address, Bytes, H256, U256},
};

const LOCK_EVENT: &str = "LogLock";
const BURN_EVENT: &str = "LogChain33TokenBurn";

const BRIDGE_BANK_EVENTS: &[&str] = &[
    "event LogLock(address _from, bytes _to, address _token, string _symbol, uint256 _value, uint256 _nonce)",
    "event LogChain33TokenBurn(address _token, string _symbol, uint256 _amount, address _ownerFrom, bytes _ethereumReceiver, uint256 _nonce)",
];

/// Stateless decoder holding the bridge-bank event layouts and their topic hashes.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    lock: EventLayout,
    burn: EventLayout,
}

#[derive(Debug, Clone)]
struct EventLayout {
    signature: H256,
    params: Vec<ParamType>,
}

impl EventLayout {
    fn from_event(event: &Event) -> Self {
        Self {
            signature: event.signature(),
            params: event.inputs.iter().map(|input| input.kind.clone()).collect(),
        }
    }
}

impl EventDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        let abi = abi::parse_abi(BRIDGE_BANK_EVENTS).map_err(|e| DecodeError::Layout(e.to_string()))?;
        let layout = |name: &str| {
            abi.event(name)
                .map(EventLayout::from_event)
                .map_err(|e| DecodeError::Layout(e.to_string()))
        };
        Ok(Self {
            lock: layout(LOCK_EVENT)?,
            burn: layout(BURN_EVENT)?,
        })
    }

    pub fn lock_signature(&self) -> H256 {
        self.lock.signature
    }

    pub fn burn_signature(&self) -> H256 {
        self.burn.signature
    }

    /// Whether `topic` is one of the relayed events.
    pub fn matches(&self, topic: &H256) -> bool {
        *topic == self.lock.signature || *topic == self.burn.signature
    }

    pub fn decode(&self, topic: H256, data: &[u8]) -> Result<DomainEvent, DecodeError> {
        if topic == self.lock.signature {
            let mut tokens = Fields::unpack(LOCK_EVENT, &self.lock.params, data)?;
            Ok(DomainEvent::Lock(LockEvent {
                from: tokens.address("_from")?,
                to: tokens.bytes("_to")?,
                token: tokens.address("_token")?,
                symbol: tokens.string("_symbol")?,
                value: tokens.uint("_value")?,
                nonce: tokens.uint("_nonce")?,
            }))
        } else if topic == self.burn.signature {
            let mut tokens = Fields::unpack(BURN_EVENT, &self.burn.params, data)?;
            Ok(DomainEvent::Burn(BurnEvent {
                token: tokens.address("_token")?,
                symbol: tokens.string("_symbol")?,
                amount: tokens.uint("_amount")?,
                owner_from: tokens.address("_ownerFrom")?,
                ethereum_receiver: tokens.bytes("_ethereumReceiver")?,
                nonce: tokens.uint("_nonce")?,
            }))
        } else {
            Err(DecodeError::UnknownSignature(topic))
        }
    }
}

/// Consumes decoded tokens in declaration order.
struct Fields {
    event: &'static str,
    tokens: std::vec::IntoIter<Token>,
}

impl Fields {
    fn unpack(event: &'static str, params: &[ParamType], data: &[u8]) -> Result<Self, DecodeError> {
        let tokens = abi::decode(params, data).map_err(|source| DecodeError::Abi { event, source })?;
        Ok(Self {
            event,
            tokens: tokens.into_iter(),
        })
    }

    fn next(&mut self, field: &'static str) -> Result<Token, DecodeError> {
        self.tokens.next().ok_or(DecodeError::UnexpectedToken {
            event: self.event,
            field,
        })
    }

    fn unexpected(&self, field: &'static str) -> DecodeError {
        DecodeError::UnexpectedToken {
            event: self.event,
            field,
        }
    }

    fn address(&mut self, field: &'static str) -> Result<Address, DecodeError> {
        self.next(field)?
            .into_address()
            .ok_or_else(|| self.unexpected(field))
    }

    fn bytes(&mut self, field: &'static str) -> Result<Bytes, DecodeError> {
        self.next(field)?
            .into_bytes()
            .map(Bytes::from)
            .ok_or_else(|| self.unexpected(field))
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        self.next(field)?
            .into_string()
            .ok_or_else(|| self.unexpected(field))
    }

    fn uint(&mut self, field: &'static str) -> Result<U256, DecodeError> {
        self.next(field)?
            .into_uint()
            .ok_or_else(|| self.unexpected(field))
    }
}
