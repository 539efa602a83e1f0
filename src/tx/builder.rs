//! Transaction Builder
//!
//! Collects typed inputs and commands, then resolves object references and
//! gas payment with read-only RPC queries to produce an
//! [`UnsignedTransaction`].

use std::collections::HashSet;

use super::types::{
    Argument, CallArg, Command, GasData, MoveCall, MoveTarget, ObjectArg, ProgrammableTransaction,
    TransactionExpiration, TypedArg, UnsignedTransaction,
};
use crate::error::{StepSignError, StepSignResult};
use crate::rpc::{ObjectOwner, SuiRpc};
use crate::sui::type_tag::TypeTag;
use crate::sui::{ObjectId, ObjectRef, SuiAddress};

/// Default gas budget in MIST (0.05 SUI)
pub const DEFAULT_GAS_BUDGET: u64 = 50_000_000;

/// Upper bound on gas payment coins the network accepts
const MAX_GAS_OBJECTS: usize = 256;

/// Inputs and commands are addressed by `u16`
const MAX_ARGUMENTS: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone)]
enum PendingInput {
    Ready(CallArg),
    /// Object given by id only; owner kind looked up at build time
    Unresolved { id: ObjectId, mutable: bool },
}

/// Builder for programmable transactions
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    sender: SuiAddress,
    inputs: Vec<PendingInput>,
    commands: Vec<Command>,
    gas_payment: Option<Vec<ObjectRef>>,
    gas_owner: Option<SuiAddress>,
    gas_price: Option<u64>,
    gas_budget: u64,
    expiration: TransactionExpiration,
}

impl TransactionBuilder {
    pub fn new(sender: SuiAddress) -> Self {
        Self {
            sender,
            inputs: Vec::new(),
            commands: Vec::new(),
            gas_payment: None,
            gas_owner: None,
            gas_price: None,
            gas_budget: DEFAULT_GAS_BUDGET,
            expiration: TransactionExpiration::None,
        }
    }

    pub fn sender(&self) -> SuiAddress {
        self.sender
    }

    // Past `MAX_ARGUMENTS` the index saturates; `check_arguments` refuses
    // to build such a transaction.
    fn push_input(&mut self, input: PendingInput) -> Argument {
        self.inputs.push(input);
        Argument::Input(argument_index(self.inputs.len() - 1).unwrap_or(u16::MAX))
    }

    fn push_command(&mut self, command: Command) -> Argument {
        self.commands.push(command);
        Argument::Result(argument_index(self.commands.len() - 1).unwrap_or(u16::MAX))
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Add a pure argument after checking its encoding against its type
    pub fn pure(&mut self, arg: TypedArg) -> StepSignResult<Argument> {
        arg.validate()?;
        if self.inputs.len() >= MAX_ARGUMENTS {
            return Err(too_many("inputs", self.inputs.len() + 1));
        }
        Ok(self.push_input(PendingInput::Ready(CallArg::Pure(arg.bytes))))
    }

    /// Add an object by id; owned vs shared is resolved at build time
    pub fn object(&mut self, id: ObjectId) -> Argument {
        if let Some(existing) = self.find_object_input(id) {
            return existing;
        }
        self.push_input(PendingInput::Unresolved { id, mutable: true })
    }

    /// Add an owned or immutable object with a known reference
    pub fn owned_object(&mut self, object_ref: ObjectRef) -> Argument {
        self.push_input(PendingInput::Ready(CallArg::Object(ObjectArg::ImmOrOwned(object_ref))))
    }

    pub fn shared_object(&mut self, id: ObjectId, initial_shared_version: u64, mutable: bool) -> Argument {
        self.push_input(PendingInput::Ready(CallArg::Object(ObjectArg::Shared {
            id,
            initial_shared_version,
            mutable,
        })))
    }

    fn find_object_input(&self, id: ObjectId) -> Option<Argument> {
        self.inputs
            .iter()
            .position(|input| input_object_id(input) == Some(id))
            .and_then(argument_index)
            .map(Argument::Input)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// `package::module::function<type_args>(args)`
    pub fn move_call(&mut self, target: &str, type_args: &[&str], args: Vec<Argument>) -> StepSignResult<Argument> {
        let target = MoveTarget::parse(target)?;
        let type_arguments = type_args
            .iter()
            .map(|t| {
                TypeTag::parse(t).map_err(|e| {
                    StepSignError::invalid_argument_encoding(format!("Invalid type argument '{}': {}", t, e))
                })
            })
            .collect::<StepSignResult<Vec<_>>>()?;

        Ok(self.push_command(Command::MoveCall(Box::new(MoveCall {
            target,
            type_arguments,
            arguments: args,
        }))))
    }

    /// Split `coin` into new coins; each amount must be a pure `u64` input.
    /// Returns the command result; use `Argument::NestedResult` to pick coins.
    pub fn split_coins(&mut self, coin: Argument, amounts: Vec<Argument>) -> Argument {
        self.push_command(Command::SplitCoins(coin, amounts))
    }

    pub fn merge_coins(&mut self, destination: Argument, sources: Vec<Argument>) -> Argument {
        self.push_command(Command::MergeCoins(destination, sources))
    }

    pub fn transfer_objects(&mut self, objects: Vec<Argument>, recipient: Argument) {
        self.push_command(Command::TransferObjects(objects, recipient));
    }

    // =========================================================================
    // Gas and expiration
    // =========================================================================

    pub fn gas_budget(&mut self, budget: u64) -> &mut Self {
        self.gas_budget = budget;
        self
    }

    pub fn gas_price(&mut self, price: u64) -> &mut Self {
        self.gas_price = Some(price);
        self
    }

    pub fn gas_payment(&mut self, payment: Vec<ObjectRef>) -> &mut Self {
        self.gas_payment = Some(payment);
        self
    }

    /// Sponsor address; defaults to the sender
    pub fn gas_owner(&mut self, owner: SuiAddress) -> &mut Self {
        self.gas_owner = Some(owner);
        self
    }

    pub fn expiration_epoch(&mut self, epoch: u64) -> &mut Self {
        self.expiration = TransactionExpiration::Epoch(epoch);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Resolve objects and gas over `rpc` and produce the transaction
    pub async fn build(mut self, rpc: &dyn SuiRpc) -> StepSignResult<UnsignedTransaction> {
        self.check_arguments()?;
        self.resolve_objects(rpc).await?;

        if self.gas_price.is_none() {
            let price = rpc.reference_gas_price().await.map_err(|e| {
                StepSignError::gas_resolution("Failed to read reference gas price").with_details(e.to_string())
            })?;
            self.gas_price = Some(price);
        }

        if self.gas_payment.is_none() {
            let owner = self.gas_owner.unwrap_or(self.sender);
            let coins = rpc.get_coins(owner).await.map_err(|e| {
                StepSignError::gas_resolution(format!("Failed to list gas coins for {}", owner))
                    .with_details(e.to_string())
            })?;

            let used: HashSet<ObjectId> = self.inputs.iter().filter_map(input_object_id).collect();
            let mut payment = Vec::new();
            let mut total: u64 = 0;
            for coin in coins.iter().filter(|c| !used.contains(&c.object_ref.object_id)) {
                if total >= self.gas_budget || payment.len() == MAX_GAS_OBJECTS {
                    break;
                }
                payment.push(coin.object_ref);
                total = total.saturating_add(coin.balance);
            }

            if payment.is_empty() {
                return Err(StepSignError::gas_resolution(format!(
                    "{} holds no spendable gas coins",
                    owner
                )));
            }
            if total < self.gas_budget {
                return Err(StepSignError::gas_resolution(format!(
                    "Gas coins hold {} MIST, budget is {}",
                    total, self.gas_budget
                )));
            }
            crate::log_debug!("builder", "Resolved gas payment", coins = payment.len(), balance = total);
            self.gas_payment = Some(payment);
        }

        self.finish()
    }

    /// Resolve object inputs only and produce the transaction kind.
    ///
    /// Gas is not part of the kind, so no coins are looked up.
    pub async fn build_kind(mut self, rpc: &dyn SuiRpc) -> StepSignResult<ProgrammableTransaction> {
        self.check_arguments()?;
        self.resolve_objects(rpc).await?;
        Ok(ProgrammableTransaction {
            inputs: self.ready_inputs()?,
            commands: self.commands,
        })
    }

    async fn resolve_objects(&mut self, rpc: &dyn SuiRpc) -> StepSignResult<()> {
        for input in self.inputs.iter_mut() {
            if let PendingInput::Unresolved { id, mutable } = *input {
                let object = rpc.get_object(id).await.map_err(|e| {
                    StepSignError::invalid_input(format!("Cannot resolve object input {}", id))
                        .with_details(e.to_string())
                })?;
                let arg = match object.owner {
                    ObjectOwner::Shared { initial_shared_version } => ObjectArg::Shared {
                        id,
                        initial_shared_version,
                        mutable,
                    },
                    _ => ObjectArg::ImmOrOwned(object.object_ref),
                };
                *input = PendingInput::Ready(CallArg::Object(arg));
            }
        }
        Ok(())
    }

    /// Produce the transaction without network access.
    ///
    /// Every object must already carry a reference and gas payment and
    /// price must be set.
    pub fn build_offline(self) -> StepSignResult<UnsignedTransaction> {
        self.check_arguments()?;
        self.finish()
    }

    fn check_arguments(&self) -> StepSignResult<()> {
        if self.commands.is_empty() {
            return Err(StepSignError::invalid_input("Transaction has no commands"));
        }
        if self.inputs.len() > MAX_ARGUMENTS {
            return Err(too_many("inputs", self.inputs.len()));
        }
        if self.commands.len() > MAX_ARGUMENTS {
            return Err(too_many("commands", self.commands.len()));
        }

        let input_count = self.inputs.len();
        for (index, command) in self.commands.iter().enumerate() {
            for arg in command_arguments(command) {
                let ok = match arg {
                    Argument::GasCoin => true,
                    Argument::Input(i) => (i as usize) < input_count,
                    Argument::Result(i) | Argument::NestedResult(i, _) => (i as usize) < index,
                };
                if !ok {
                    return Err(StepSignError::invalid_argument_encoding(format!(
                        "Command {} refers to unavailable argument {:?}",
                        index, arg
                    )));
                }
            }
        }
        Ok(())
    }

    fn ready_inputs(&self) -> StepSignResult<Vec<CallArg>> {
        self.inputs
            .iter()
            .map(|input| match input {
                PendingInput::Ready(arg) => Ok(arg.clone()),
                PendingInput::Unresolved { id, .. } => Err(StepSignError::invalid_input(format!(
                    "Object input {} was not resolved",
                    id
                ))),
            })
            .collect()
    }

    fn finish(self) -> StepSignResult<UnsignedTransaction> {
        let inputs = self.ready_inputs()?;

        let payment = self
            .gas_payment
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StepSignError::gas_resolution("No gas payment set"))?;
        let price = self
            .gas_price
            .ok_or_else(|| StepSignError::gas_resolution("No gas price set"))?;

        Ok(UnsignedTransaction::from_parts(
            self.sender,
            GasData {
                payment,
                owner: self.gas_owner.unwrap_or(self.sender),
                price,
                budget: self.gas_budget,
            },
            ProgrammableTransaction {
                inputs,
                commands: self.commands,
            },
            self.expiration,
        ))
    }
}

fn argument_index(position: usize) -> Option<u16> {
    u16::try_from(position).ok()
}

fn too_many(what: &str, count: usize) -> StepSignError {
    StepSignError::invalid_argument_encoding(format!(
        "Transaction has {} {}, at most {} can be addressed",
        count, what, MAX_ARGUMENTS
    ))
}

fn input_object_id(input: &PendingInput) -> Option<ObjectId> {
    match input {
        PendingInput::Unresolved { id, .. } => Some(*id),
        PendingInput::Ready(CallArg::Object(ObjectArg::ImmOrOwned(r))) => Some(r.object_id),
        PendingInput::Ready(CallArg::Object(ObjectArg::Shared { id, .. })) => Some(*id),
        PendingInput::Ready(CallArg::Pure(_)) => None,
    }
}

fn command_arguments(command: &Command) -> Vec<Argument> {
    match command {
        Command::MoveCall(call) => call.arguments.clone(),
        Command::TransferObjects(objects, recipient) => {
            let mut all = objects.clone();
            all.push(*recipient);
            all
        }
        Command::SplitCoins(coin, amounts) => {
            let mut all = vec![*coin];
            all.extend_from_slice(amounts);
            all
        }
        Command::MergeCoins(destination, sources) => {
            let mut all = vec![*destination];
            all.extend_from_slice(sources);
            all
        }
    }
}
