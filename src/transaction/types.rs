/// Transaction types for ZeroCoin
use crate::crypto::KeyPair;
use crate::error::ChainError;
use std::fmt;

const FROM_LABEL: &str = "From: ";
const TO_LABEL: &str = "To: ";
const AMOUNT_LABEL: &str = "Amount: ";
const DATE_LABEL: &str = "Date: ";

/// Timestamp format used for new statements. Ledger code treats dates as opaque text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Canonical signing payload: four labeled lines, no trailing newline.
pub fn encode(sender: &str, receiver: &str, amount: u64, timestamp: &str) -> String {
    format!(
        "{FROM_LABEL}{sender}\n{TO_LABEL}{receiver}\n{AMOUNT_LABEL}{amount}\n{DATE_LABEL}{timestamp}"
    )
}

/// Ledger line stored in the mempool and in block bodies.
pub fn ledger_line(sender: &str, receiver: &str, amount: u64, timestamp: &str) -> String {
    format!("{sender} transferred {amount} to {receiver} on {timestamp}")
}

/// The fields of one transaction, independent of how it is written down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionRecord {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub timestamp: String,
}

impl TransactionRecord {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u64,
        timestamp: impl Into<String>,
    ) -> Self {
        TransactionRecord {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: timestamp.into(),
        }
    }

    /// Funding transactions come from the issuer and carry no signature.
    pub fn is_funding(&self, issuer: &str) -> bool {
        self.sender == issuer
    }

    pub fn signing_payload(&self) -> String {
        encode(&self.sender, &self.receiver, self.amount, &self.timestamp)
    }

    pub fn ledger_line(&self) -> String {
        ledger_line(&self.sender, &self.receiver, self.amount, &self.timestamp)
    }
}

/// One line of a block body or of the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionLine {
    Transfer(TransactionRecord),
    /// Anything that does not follow the ledger line pattern, kept byte for byte.
    Unparsed(String),
}

impl TransactionLine {
    /// Total parser: every input maps to a line that formats back to the same text.
    pub fn parse(line: &str) -> Self {
        match Self::parse_record(line) {
            Some(record) if record.ledger_line() == line => TransactionLine::Transfer(record),
            _ => TransactionLine::Unparsed(line.to_string()),
        }
    }

    fn parse_record(line: &str) -> Option<TransactionRecord> {
        let (sender, rest) = line.split_once(" transferred ")?;
        let (amount, rest) = rest.split_once(" to ")?;
        let (receiver, timestamp) = rest.split_once(" on ")?;
        if sender.is_empty() || receiver.is_empty() {
            return None;
        }
        let amount = amount.parse::<u64>().ok()?;
        Some(TransactionRecord::new(sender, receiver, amount, timestamp))
    }

    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            TransactionLine::Transfer(record) => Some(record),
            TransactionLine::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for TransactionLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionLine::Transfer(record) => f.write_str(&record.ledger_line()),
            TransactionLine::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// A transaction statement file: labeled fields plus an optional hex signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub record: TransactionRecord,
    pub signature: Option<String>,
}

impl Statement {
    pub fn funding(issuer: &str, receiver: &str, amount: u64, timestamp: &str) -> Self {
        Statement {
            record: TransactionRecord::new(issuer, receiver, amount, timestamp),
            signature: None,
        }
    }

    /// Builds a transfer from `keypair`'s wallet and signs its canonical encoding.
    pub fn signed_transfer(
        keypair: &KeyPair,
        receiver: &str,
        amount: u64,
        timestamp: &str,
    ) -> Result<Self, ChainError> {
        let record = TransactionRecord::new(keypair.tag(), receiver, amount, timestamp);
        let signature = keypair.sign(record.signing_payload().as_bytes())?;
        Ok(Statement {
            record,
            signature: Some(hex::encode(signature)),
        })
    }

    /// Parses statement text. Fields may appear in any order; the first
    /// occurrence of each label wins.
    pub fn parse(text: &str) -> Result<Self, ChainError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();

        let field = |label: &str| -> Result<&str, ChainError> {
            lines
                .iter()
                .find_map(|line| line.strip_prefix(label))
                .ok_or_else(|| {
                    ChainError::MalformedStatement(format!(
                        "missing '{}' field",
                        label.trim_end_matches(": ")
                    ))
                })
        };

        let sender = field(FROM_LABEL)?;
        let receiver = field(TO_LABEL)?;
        let amount_text = field(AMOUNT_LABEL)?;
        let timestamp = field(DATE_LABEL)?;

        let amount = amount_text.parse::<u64>().map_err(|_| {
            ChainError::MalformedStatement(format!("amount '{}' is not a non-negative integer", amount_text))
        })?;

        let signature = lines
            .iter()
            .rev()
            .find(|line| !line.is_empty())
            .filter(|line| !is_labeled(line))
            .map(|line| line.to_string());

        Ok(Statement {
            record: TransactionRecord::new(sender, receiver, amount, timestamp),
            signature,
        })
    }

    /// Statement file text. Funding statements end with a newline; signed
    /// statements end with the signature line.
    pub fn render(&self) -> String {
        let body = self.record.signing_payload();
        match &self.signature {
            Some(signature) => format!("{body}\n\n{signature}"),
            None => format!("{body}\n"),
        }
    }
}

fn is_labeled(line: &str) -> bool {
    [FROM_LABEL, TO_LABEL, AMOUNT_LABEL, DATE_LABEL]
        .iter()
        .any(|label| line.starts_with(label))
}
