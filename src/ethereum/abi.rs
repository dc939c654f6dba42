use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Event, Function, JsonAbi};
use alloy::primitives::{Bytes, B256};
use tracing::debug;

use super::error::GatewayError;
use super::ContractRole;

/// Bumped whenever either embedded ABI changes shape.
pub const INTERFACE_VERSION: &str = "1.0.0";

const SALE_ABI: &str = include_str!("../../abi/sale.json");
const TOKEN_ABI: &str = include_str!("../../abi/token.json");

/// Static description of the sale and token contract interfaces.
///
/// Every encode and decode in the gateway goes through here so a call can only
/// be built for a method the contract actually declares.
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    sale: JsonAbi,
    token: JsonAbi,
}

impl InterfaceDescriptor {
    /// Parses the embedded interface definitions.
    pub fn load() -> Result<Self, GatewayError> {
        Self::from_json(SALE_ABI, TOKEN_ABI)
    }

    pub fn from_json(sale: &str, token: &str) -> Result<Self, GatewayError> {
        let sale: JsonAbi = serde_json::from_str(sale).map_err(|e| {
            GatewayError::InvalidFormat(format!("failed to parse sale ABI: {}", e))
        })?;
        let token: JsonAbi = serde_json::from_str(token).map_err(|e| {
            GatewayError::InvalidFormat(format!("failed to parse token ABI: {}", e))
        })?;

        debug!(
            version = INTERFACE_VERSION,
            sale_functions = sale.functions().count(),
            token_functions = token.functions().count(),
            "Loaded contract interface descriptor"
        );

        Ok(Self { sale, token })
    }

    fn abi(&self, role: ContractRole) -> &JsonAbi {
        match role {
            ContractRole::Sale => &self.sale,
            ContractRole::Token => &self.token,
        }
    }

    pub fn function(&self, role: ContractRole, name: &str) -> Result<&Function, GatewayError> {
        self.abi(role)
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| GatewayError::UnknownMethod {
                role,
                name: name.to_string(),
            })
    }

    pub fn event(&self, role: ContractRole, name: &str) -> Result<&Event, GatewayError> {
        self.abi(role)
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| GatewayError::UnknownMethod {
                role,
                name: name.to_string(),
            })
    }

    /// Topic-0 hash of an event.
    pub fn event_signature(&self, role: ContractRole, name: &str) -> Result<B256, GatewayError> {
        Ok(self.event(role, name)?.selector())
    }

    /// Builds selector-prefixed calldata for `name`.
    pub fn encode_call(
        &self,
        role: ContractRole,
        name: &str,
        args: &[DynSolValue],
    ) -> Result<Bytes, GatewayError> {
        let function = self.function(role, name)?;

        if args.len() != function.inputs.len() {
            return Err(GatewayError::InvalidFormat(format!(
                "'{}' takes {} arguments, got {}",
                name,
                function.inputs.len(),
                args.len()
            )));
        }

        function
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(|e| {
                GatewayError::InvalidFormat(format!("failed to encode '{}' arguments: {}", name, e))
            })
    }

    /// Decodes raw return data, checking it against the declared outputs.
    pub fn decode_output(
        &self,
        role: ContractRole,
        name: &str,
        data: &[u8],
    ) -> Result<Vec<DynSolValue>, GatewayError> {
        let function = self.function(role, name)?;

        let values = function
            .abi_decode_output(data, true)
            .map_err(|e| GatewayError::UnexpectedOutput {
                method: name.to_string(),
                reason: e.to_string(),
            })?;

        if values.len() != function.outputs.len() {
            return Err(GatewayError::UnexpectedOutput {
                method: name.to_string(),
                reason: format!(
                    "expected {} values, decoded {}",
                    function.outputs.len(),
                    values.len()
                ),
            });
        }

        Ok(values)
    }
}
