//! Command-line interface for samlkit

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use samlkit::config::Config;
#[cfg(feature = "cli")]
use samlkit::validation::saml2::standard_saml2_assertion_chain;
#[cfg(feature = "cli")]
use samlkit::validation::{keys, ParameterValue, ValidationResult};
#[cfg(feature = "cli")]
use samlkit::xml::kind::ElementTag;
#[cfg(feature = "cli")]
use samlkit::xml::{unmarshall_from_bytes, ObjectId, ProviderRegistry, XmlTree};
#[cfg(feature = "cli")]
use samlkit::xmlsec::{Credential, SignatureProfileValidator, SignatureValidator};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "samlkit")]
#[command(author, version, about = "SAML object inspection, signature verification and validation", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the object tree of a SAML document
    Inspect {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Verify every signature in a document
    Verify {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Shared HMAC secret
        #[arg(long)]
        hmac_secret: String,
    },

    /// Run the SAML 2.0 assertion validator chain on every assertion
    Validate {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Acceptable audience (repeatable)
        #[arg(long)]
        audience: Vec<String>,

        /// Acceptable recipient (repeatable)
        #[arg(long)]
        recipient: Vec<String>,

        /// Shared HMAC secret used to verify signatures
        #[arg(long)]
        hmac_secret: Option<String>,

        /// Accept unsigned assertions
        #[arg(long)]
        no_signature_required: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Commands::Inspect { file, json } => cmd_inspect(&config, file, json),
        Commands::Verify { file, hmac_secret } => cmd_verify(&config, file, hmac_secret),
        Commands::Validate {
            file,
            audience,
            recipient,
            hmac_secret,
            no_signature_required,
        } => cmd_validate(&config, file, audience, recipient, hmac_secret, no_signature_required),
    });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "cli")]
type CliResult = Result<bool, Box<dyn std::error::Error>>;

#[cfg(feature = "cli")]
fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    })
}

#[cfg(feature = "cli")]
fn load(config: &Config, file: &PathBuf) -> Result<(XmlTree, ProviderRegistry, ObjectId), Box<dyn std::error::Error>> {
    let registry = config.build_registry()?;
    let pool = config.build_parser_pool();
    let input = fs::read(file)?;
    let mut tree = XmlTree::new();
    let root = unmarshall_from_bytes(&mut tree, &registry, &pool, &input)?;
    Ok((tree, registry, root))
}

#[cfg(feature = "cli")]
fn objects_tagged(tree: &XmlTree, root: ObjectId, tag: ElementTag) -> Vec<ObjectId> {
    tree.descendants(root)
        .into_iter()
        .filter(|&id| tree.get(id).map(|o| o.tag() == tag).unwrap_or(false))
        .collect()
}

#[cfg(feature = "cli")]
fn cmd_inspect(config: &Config, file: PathBuf, json_output: bool) -> CliResult {
    let (tree, _, root) = load(config, &file)?;
    if json_output {
        let json = object_json(&tree, root)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("samlkit v{}", samlkit::VERSION);
        println!();
        print_object(&tree, root, 0)?;
    }
    Ok(true)
}

#[cfg(feature = "cli")]
fn print_object(tree: &XmlTree, id: ObjectId, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    let object = tree.get(id)?;
    let mut line = format!("{}{} ({:?})", "  ".repeat(depth), object.element_name(), object.tag());
    if let Some(xml_id) = tree.xml_id(id) {
        line.push_str(&format!(" ID={}", xml_id));
    }
    if tree.signature_of(id).is_some() {
        line.push_str(" [signed]");
    }
    println!("{}", line);
    for child in tree.children(id) {
        print_object(tree, child, depth + 1)?;
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn object_json(tree: &XmlTree, id: ObjectId) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let object = tree.get(id)?;
    let children = tree
        .children(id)
        .into_iter()
        .map(|child| object_json(tree, child))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::json!({
        "name": object.element_name().to_string(),
        "kind": format!("{:?}", object.tag()),
        "id": tree.xml_id(id),
        "signed": tree.signature_of(id).is_some(),
        "children": children,
    }))
}

#[cfg(feature = "cli")]
fn cmd_verify(config: &Config, file: PathBuf, hmac_secret: String) -> CliResult {
    let (tree, _, root) = load(config, &file)?;
    let signatures = objects_tagged(&tree, root, ElementTag::Signature);
    if signatures.is_empty() {
        println!("✗ Document carries no signature");
        return Ok(false);
    }

    let validator = SignatureValidator::new(Credential::hmac(hmac_secret.into_bytes()));
    let mut all_valid = true;
    for signature in signatures {
        let signed = tree
            .parent(signature)
            .map(|p| tree.get(p).map(|o| o.element_name().to_string()))
            .transpose()?
            .unwrap_or_else(|| "(detached)".to_string());
        let outcome = SignatureProfileValidator
            .check(&tree, signature)
            .and_then(|()| validator.verify(&tree, signature));
        match outcome {
            Ok(()) => println!("✓ Signature on {} is valid", signed),
            Err(e) => {
                all_valid = false;
                println!("✗ Signature on {} is invalid: {}", signed, e);
            }
        }
    }
    Ok(all_valid)
}

#[cfg(feature = "cli")]
fn cmd_validate(
    config: &Config,
    file: PathBuf,
    audiences: Vec<String>,
    recipients: Vec<String>,
    hmac_secret: Option<String>,
    no_signature_required: bool,
) -> CliResult {
    let (tree, _, root) = load(config, &file)?;
    let assertions = objects_tagged(&tree, root, ElementTag::Assertion);
    if assertions.is_empty() {
        println!("✗ Document carries no SAML 2.0 assertion");
        return Ok(false);
    }

    let chain = standard_saml2_assertion_chain(hmac_secret.map(|s| Credential::hmac(s.into_bytes())));
    let mut all_valid = true;
    for assertion in assertions {
        let mut ctx = config
            .validation_context()
            .with_param(keys::SIGNATURE_REQUIRED, ParameterValue::Flag(!no_signature_required));
        if !audiences.is_empty() {
            ctx = ctx.with_strings(keys::VALID_AUDIENCES, audiences.iter().cloned());
        }
        if !recipients.is_empty() {
            ctx = ctx.with_strings(keys::VALID_RECIPIENTS, recipients.iter().cloned());
        }

        let result = chain.validate(&tree, assertion, &mut ctx)?;
        let label = tree.xml_id(assertion).unwrap_or("(no ID)");
        match (result, ctx.failure_message()) {
            (ValidationResult::Valid, _) => println!("✓ Assertion {}: {}", label, result),
            (_, Some(message)) => println!("✗ Assertion {}: {} ({})", label, result, message),
            (_, None) => println!("✗ Assertion {}: {}", label, result),
        }
        all_valid &= result == ValidationResult::Valid;
    }
    Ok(all_valid)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
