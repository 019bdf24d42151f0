//! Script assembly and the output encodings a swap script can be locked under.
//!
//! Redeem scripts are described as a sequence of [`ScriptElement`]s and only
//! turned into bytes by [`ScriptTemplate::serialize`], so the same assembler
//! builds both HTLC scripts and the nested-SegWit wrapper.

use lwk_wollet::elements::hashes::{Hash, sha256};
use lwk_wollet::elements::opcodes;
use lwk_wollet::elements::opcodes::all::{
    OP_PUSHBYTES_0, OP_PUSHNUM_1, OP_PUSHNUM_16, OP_PUSHNUM_NEG1,
};
use lwk_wollet::elements::script::{Builder, Instruction, read_scriptint};
use lwk_wollet::elements::Script;

use crate::error::{Error, Result};

/// One element of a script: an opcode, a data push or a script number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptElement {
    Op(opcodes::All),
    Push(Vec<u8>),
    /// Serialized with the minimal number push, so -1 and 1..=16 become
    /// small-integer opcodes and 0 an empty push.
    Number(i64),
}

impl ScriptElement {
    /// Reads the element as a script number, if it is one. Parsed pushes
    /// longer than four bytes are not numbers.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            ScriptElement::Number(n) => Some(*n),
            ScriptElement::Push(data) => read_scriptint(data).ok(),
            ScriptElement::Op(op) if *op == OP_PUSHNUM_NEG1 => Some(-1),
            ScriptElement::Op(op) => {
                let code = op.into_u8();
                let first = OP_PUSHNUM_1.into_u8();
                (first..=OP_PUSHNUM_16.into_u8())
                    .contains(&code)
                    .then(|| i64::from(code - first + 1))
            }
        }
    }
}

/// Ordered element sequence that serializes into a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTemplate(Vec<ScriptElement>);

impl ScriptTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: opcodes::All) -> Self {
        self.0.push(ScriptElement::Op(op));
        self
    }

    pub fn push(mut self, data: &[u8]) -> Self {
        self.0.push(ScriptElement::Push(data.to_vec()));
        self
    }

    pub fn number(mut self, n: i64) -> Self {
        self.0.push(ScriptElement::Number(n));
        self
    }

    pub fn elements(&self) -> &[ScriptElement] {
        &self.0
    }

    /// Serializes the elements, choosing the shortest push encoding for each
    /// data element and number.
    pub fn serialize(&self) -> Script {
        self.0
            .iter()
            .fold(Builder::new(), |builder, element| match element {
                ScriptElement::Op(op) => builder.push_opcode(*op),
                ScriptElement::Push(data) => builder.push_slice(data),
                ScriptElement::Number(n) => builder.push_int(*n),
            })
            .into_script()
    }

    /// Splits a serialized script back into elements. Returns `None` when the
    /// script contains a truncated push.
    pub fn parse(script: &Script) -> Option<Self> {
        let mut elements = Vec::new();
        for instruction in script.instructions() {
            match instruction.ok()? {
                Instruction::PushBytes(data) => elements.push(ScriptElement::Push(data.to_vec())),
                Instruction::Op(op) => elements.push(ScriptElement::Op(op)),
            }
        }
        Some(Self(elements))
    }
}

impl From<Vec<ScriptElement>> for ScriptTemplate {
    fn from(elements: Vec<ScriptElement>) -> Self {
        Self(elements)
    }
}

/// How a redeem script is committed to in an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// P2WSH.
    NativeWitness,
    /// P2SH.
    Legacy,
    /// P2SH wrapping a P2WSH program.
    NestedWitness,
    /// Recognised so it can be rejected; never encoded or spent.
    Taproot,
}

impl OutputType {
    /// Encodings a swap script can actually be locked under.
    pub const SCRIPT_HASH_TYPES: [OutputType; 3] = [
        OutputType::NativeWitness,
        OutputType::Legacy,
        OutputType::NestedWitness,
    ];

    pub fn is_witness(self) -> bool {
        matches!(self, OutputType::NativeWitness | OutputType::NestedWitness)
    }
}

/// `OP_0 <sha256(redeem)>`
pub fn p2wsh_output(redeem_script: &Script) -> Script {
    witness_program(redeem_script)
}

/// `OP_HASH160 <hash160(redeem)> OP_EQUAL`
pub fn p2sh_output(redeem_script: &Script) -> Script {
    redeem_script.to_p2sh()
}

/// P2SH of the P2WSH witness program.
pub fn p2sh_p2wsh_output(redeem_script: &Script) -> Script {
    p2sh_output(&nested_redeem_script(redeem_script))
}

/// The witness program a nested-SegWit output's P2SH hash commits to.
pub fn nested_redeem_script(redeem_script: &Script) -> Script {
    witness_program(redeem_script)
}

/// Unlocking script of a nested-SegWit spend: a single push of the witness
/// program.
pub fn nested_unlocking_script(redeem_script: &Script) -> Script {
    ScriptTemplate::new()
        .push(nested_redeem_script(redeem_script).as_bytes())
        .serialize()
}

fn witness_program(redeem_script: &Script) -> Script {
    let hash = sha256::Hash::hash(redeem_script.as_bytes());
    ScriptTemplate::new()
        .op(OP_PUSHBYTES_0)
        .push(hash.as_byte_array())
        .serialize()
}

/// Output script locking `redeem_script` under `output_type`.
pub fn output_script(redeem_script: &Script, output_type: OutputType) -> Result<Script> {
    match output_type {
        OutputType::NativeWitness => Ok(p2wsh_output(redeem_script)),
        OutputType::Legacy => Ok(p2sh_output(redeem_script)),
        OutputType::NestedWitness => Ok(p2sh_p2wsh_output(redeem_script)),
        OutputType::Taproot => Err(Error::UnsupportedEncoding(0)),
    }
}
