//! Table-driven contract calls.
//!
//! A [`ContractDispatcher`] maps a method name to a [`MethodDescriptor`],
//! encodes the arguments with an injected [`AbiCodec`], hands the prepared
//! `eth_call` to a [`CallExecutor`] and decodes the returned data with the
//! same codec. The ABI codec itself lives outside this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethlink_core::error::RpcError;
use ethlink_core::result::RpcResult;

use crate::client::RpcClient;
use crate::eth::{BlockNumber, CallRequest};

/// Turns typed values into hex call data and back.
pub trait AbiCodec: Send + Sync + 'static {
    type Value: Clone + Send + 'static;
    type Type: Clone + Send + Sync + 'static;

    /// Encode `values` as the argument tuple `types`. Returns hex, with or
    /// without a `0x` prefix.
    fn encode(&self, types: &[Self::Type], values: &[Self::Value]) -> Result<String, RpcError>;

    fn decode(&self, data: &str, output: &Self::Type) -> Result<Self::Value, RpcError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor<T> {
    pub name: String,
    /// 4-byte selector as hex, e.g. `0x70a08231`.
    pub selector: String,
    pub inputs: Vec<T>,
    pub output: T,
}

impl<T> MethodDescriptor<T> {
    pub fn new(name: impl Into<String>, selector: impl Into<String>, inputs: Vec<T>, output: T) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            inputs,
            output,
        }
    }
}

/// An `eth_call` ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub method: String,
    pub call: CallRequest,
    pub block: BlockNumber,
}

/// A call recorded instead of executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub to: String,
    pub from: Option<String>,
    pub data: String,
    pub block: BlockNumber,
}

impl From<PreparedCall> for CapturedCall {
    fn from(prepared: PreparedCall) -> Self {
        Self {
            method: prepared.method,
            to: prepared.call.to,
            from: prepared.call.from,
            data: prepared.call.data,
            block: prepared.block,
        }
    }
}

pub enum DispatchOutcome<T> {
    Executed(RpcResult<T>),
    Captured(CapturedCall),
}

impl<T> DispatchOutcome<T> {
    pub fn executed(self) -> Option<RpcResult<T>> {
        match self {
            Self::Executed(result) => Some(result),
            Self::Captured(_) => None,
        }
    }

    pub fn captured(self) -> Option<CapturedCall> {
        match self {
            Self::Captured(call) => Some(call),
            Self::Executed(_) => None,
        }
    }
}

/// Decides what happens to a prepared call.
pub trait CallExecutor: Send + Sync {
    /// Returns the raw hex output, or the captured call.
    fn execute(&self, call: PreparedCall) -> DispatchOutcome<String>;
}

/// Sends calls to the network.
#[derive(Debug, Clone)]
pub struct RpcExecutor {
    client: RpcClient,
}

impl RpcExecutor {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

impl CallExecutor for RpcExecutor {
    fn execute(&self, call: PreparedCall) -> DispatchOutcome<String> {
        tracing::trace!(method = %call.method, to = %call.call.to, "eth_call");
        DispatchOutcome::Executed(self.client.call(&call.call, call.block))
    }
}

/// Records call data without any I/O, e.g. to build multicall batches.
#[derive(Debug, Default)]
pub struct CapturingExecutor {
    captured: Mutex<Vec<CapturedCall>>,
}

impl CapturingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<CapturedCall> {
        self.captured.lock().unwrap().clone()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<CapturedCall> {
        std::mem::take(&mut *self.captured.lock().unwrap())
    }
}

impl CallExecutor for CapturingExecutor {
    fn execute(&self, call: PreparedCall) -> DispatchOutcome<String> {
        let captured = CapturedCall::from(call);
        self.captured.lock().unwrap().push(captured.clone());
        DispatchOutcome::Captured(captured)
    }
}

/// Dispatches named calls against one contract.
pub struct ContractDispatcher<C: AbiCodec> {
    codec: Arc<C>,
    address: String,
    from: Option<String>,
    block: BlockNumber,
    methods: HashMap<String, MethodDescriptor<C::Type>>,
}

impl<C: AbiCodec> ContractDispatcher<C> {
    pub fn new(
        codec: Arc<C>,
        address: impl Into<String>,
        methods: impl IntoIterator<Item = MethodDescriptor<C::Type>>,
    ) -> Self {
        Self {
            codec,
            address: address.into(),
            from: None,
            block: BlockNumber::Latest,
            methods: methods.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn at_block(mut self, block: BlockNumber) -> Self {
        self.block = block;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor<C::Type>> {
        self.methods.get(name)
    }

    /// Encode a call without executing it.
    pub fn prepare(&self, name: &str, args: &[C::Value]) -> Result<PreparedCall, RpcError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| RpcError::Other(format!("unknown contract method {name}")))?;
        if args.len() != method.inputs.len() {
            return Err(RpcError::Other(format!(
                "{name} takes {} arguments, got {}",
                method.inputs.len(),
                args.len()
            )));
        }

        let encoded = self.codec.encode(&method.inputs, args)?;
        let selector = method.selector.trim_start_matches("0x");
        let data = format!("0x{selector}{}", encoded.trim_start_matches("0x"));

        Ok(PreparedCall {
            method: method.name.clone(),
            call: CallRequest {
                from: self.from.clone(),
                to: self.address.clone(),
                data,
                gas: None,
                value: None,
            },
            block: self.block,
        })
    }

    /// Prepare and hand the call to `executor`. An executed call's output is
    /// decoded with the method's output type.
    pub fn dispatch<E>(
        &self,
        executor: &E,
        name: &str,
        args: &[C::Value],
    ) -> Result<DispatchOutcome<C::Value>, RpcError>
    where
        E: CallExecutor + ?Sized,
    {
        let prepared = self.prepare(name, args)?;
        let output = self.methods[&prepared.method].output.clone();

        Ok(match executor.execute(prepared) {
            DispatchOutcome::Executed(raw) => {
                let codec = Arc::clone(&self.codec);
                DispatchOutcome::Executed(raw.try_map(move |data| codec.decode(&data, &output)))
            }
            DispatchOutcome::Captured(call) => DispatchOutcome::Captured(call),
        })
    }
}

impl<C: AbiCodec> std::fmt::Debug for ContractDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("ContractDispatcher")
            .field("address", &self.address)
            .field("block", &self.block)
            .field("methods", &names)
            .finish()
    }
}
