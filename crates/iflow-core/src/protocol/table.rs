//! Static lookup data for protocol classification.
//!
//! All keys and raw values are matched after trimming, lowercasing and
//! collapsing inner whitespace. Add synonyms here, not in control flow.

/// Attribute keys that declare an adapter or transport, in priority order.
pub const PROTOCOL_KEYS: &[&str] = &[
    "componenttype",
    "adaptertype",
    "adapter",
    "transportprotocol",
    "transport",
    "binding",
    "messageprotocol",
];

/// Raw value -> canonical protocol name.
pub const SYNONYMS: &[(&str, &str)] = &[
    // SOAP
    ("soap", "SOAP"),
    ("soap 1.x", "SOAP"),
    ("soap1.x", "SOAP"),
    ("soap 1.1", "SOAP"),
    ("soap 1.2", "SOAP"),
    ("sap rm", "SOAP"),
    ("ws", "SOAP"),
    ("webservice", "SOAP"),
    // HTTP
    ("http", "HTTP"),
    ("https", "HTTP"),
    ("http(s)", "HTTP"),
    ("rest", "HTTP"),
    ("openconnectors", "HTTP"),
    // OData
    ("odata", "OData"),
    ("odata v2", "OData"),
    ("odata v4", "OData"),
    ("odatav2", "OData"),
    ("odatav4", "OData"),
    ("hciodata", "OData"),
    // Messaging
    ("jms", "JMS"),
    ("amqp", "AMQP"),
    ("kafka", "Kafka"),
    ("processdirect", "ProcessDirect"),
    ("process direct", "ProcessDirect"),
    // Mail
    ("mail", "Mail"),
    ("smtp", "Mail"),
    ("imap", "Mail"),
    ("imap4", "Mail"),
    ("pop3", "Mail"),
    // File transfer
    ("sftp", "SFTP"),
    ("ftp", "FTP"),
    ("ftps", "FTP"),
    ("as2", "AS2"),
    ("as4", "AS4"),
    // SAP specific
    ("idoc", "IDoc"),
    ("idoc soap", "IDoc"),
    ("rfc", "RFC"),
    ("xi", "XI"),
    ("successfactors", "SuccessFactors"),
    ("sfsf", "SuccessFactors"),
    ("ariba", "Ariba"),
    ("salesforce", "Salesforce"),
    ("ldap", "LDAP"),
    ("elster", "ELSTER"),
    ("odc", "ODC"),
];

/// Values that appear under protocol keys but are not transports.
pub const NON_PROTOCOLS: &[&str] = &[
    "",
    "none",
    "not applicable",
    "n/a",
    "script",
    "groovy",
    "groovyscript",
    "javascript",
    "java",
    "xslt",
    "mapping",
    "messagemapping",
    "operationmapping",
    "transformation",
];

/// Normalize a key or raw value for lookup.
pub fn fold(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical name for a folded value, if the value is a known synonym.
pub fn canonical(folded: &str) -> Option<&'static str> {
    SYNONYMS
        .iter()
        .find(|(raw, _)| raw.eq_ignore_ascii_case(folded))
        .map(|(_, name)| *name)
}

pub fn is_non_protocol(folded: &str) -> bool {
    NON_PROTOCOLS.contains(&folded)
}
