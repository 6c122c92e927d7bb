use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docmerge::config::{init_default_config, AppConfig};
use docmerge::docx::package::DocxPackage;
use docmerge::docx::xml::XmlPart;
use docmerge::render::UnresolvedPolicy;
use docmerge::report::ConsoleReport;
use docmerge::scan::BraceStyle;
use docmerge::{discover_placeholders, extract_text, render_document};

#[derive(Parser, Debug)]
#[command(name = "docmerge")]
#[command(about = "DOCX merge-field engine (tag discovery + template rendering)", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx template (drag-and-drop supported)
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: <input_stem>_filled.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Tag grammar: "guillemet" («field») or "braces" ({{field}})
    #[arg(long)]
    grammar: Option<String>,

    /// Fail when a discovered tag has no value instead of leaving it in place
    #[arg(long)]
    strict: bool,

    /// Set a tag value (repeatable): --set client_name=Alice
    #[arg(long, value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Tag values file: a .toml or .json map of tag name to value
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,

    /// Print the document's logical text, then exit
    #[arg(long)]
    dump_text: bool,

    /// Only parse + re-serialize the DOCX (no substitution)
    #[arg(long)]
    roundtrip_only: bool,

    /// Config file path (default: search for docmerge.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let report = ConsoleReport::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        report.info(format!("Wrote config: {}", cfg_path.display()));
        return Ok(());
    }

    let Some(input) = args.input else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  docmerge <template.docx>                      list merge tags\n  docmerge <template.docx> --set name=Alice -o out.docx\n\nTIPS:\n  - You can drag a .docx file onto docmerge to list its tags.\n  - Default config search: docmerge.toml (upwards), or set DOCMERGE_CONFIG.\n"
        );
        return Ok(());
    };

    let file_bytes =
        std::fs::read(&input).with_context(|| format!("read docx: {}", input.display()))?;

    if args.dump_text {
        let text = extract_text(&file_bytes).context("extract text")?;
        println!("{text}");
        return Ok(());
    }

    let output = args.output.clone().unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string();
        input.with_file_name(format!("{stem}_filled.docx"))
    });

    if args.roundtrip_only {
        let pkg = DocxPackage::from_bytes(&file_bytes).context("open docx")?;
        let mut replacements: std::collections::HashMap<String, Vec<u8>> =
            std::collections::HashMap::new();
        for ent in pkg.xml_entries() {
            if ent.data.is_empty() {
                continue;
            }
            let part = XmlPart::parse(&ent.name, &ent.data)
                .with_context(|| format!("parse xml: {}", ent.name))?;
            replacements.insert(ent.name.clone(), part.serialize());
        }
        let out = pkg
            .write_with_replacements(&replacements)
            .context("write archive")?;
        std::fs::write(&output, out)
            .with_context(|| format!("write docx: {}", output.display()))?;
        report.info(format!("Wrote round-trip copy: {}", output.display()));
        return Ok(());
    }

    let (cfg, cfg_path) = AppConfig::load(args.config.as_deref()).context("load config")?;
    if let Some(p) = &cfg_path {
        report.info(format!("Using config: {}", p.display()));
    }

    let grammar = match args.grammar.as_deref() {
        Some(s) => BraceStyle::parse(s).with_context(|| format!("unknown grammar: {s}"))?,
        None => cfg.grammar()?,
    };
    let policy = if args.strict {
        UnresolvedPolicy::Strict
    } else {
        cfg.policy()
    };

    let mut values: BTreeMap<String, String> = cfg.values.clone();
    if let Some(path) = &args.values {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read values: {}", path.display()))?;
        let file_values: BTreeMap<String, String> =
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                serde_json::from_str(&raw)
                    .with_context(|| format!("parse values json: {}", path.display()))?
            } else {
                toml::from_str(&raw)
                    .with_context(|| format!("parse values toml: {}", path.display()))?
            };
        values.extend(file_values);
    }
    for pair in &args.set {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("--set expects KEY=VALUE, got: {pair}"))?;
        values.insert(key.to_string(), value.to_string());
    }

    let render_requested = !values.is_empty() || args.output.is_some();
    if !render_requested {
        let discovery = discover_placeholders(&file_bytes, grammar).context("discover tags")?;
        for invalid in &discovery.invalid {
            report.warn(format!(
                "dropped invalid tag \u{ab}{}\u{bb} in {}",
                invalid.raw, invalid.part
            ));
        }
        if discovery.no_placeholders() {
            report.info(format!(
                "No tags found in the document. Ensure they are formatted as {}.",
                match grammar {
                    BraceStyle::Guillemet => "\u{ab}tag\u{bb}",
                    BraceStyle::DoubleBrace => "{{tag}}",
                }
            ));
            return Ok(());
        }
        for tag in &discovery.tokens {
            println!("{tag}");
        }
        return Ok(());
    }

    let out = render_document(&file_bytes, grammar, &values, policy).context("render document")?;
    std::fs::write(&output, out).with_context(|| format!("write docx: {}", output.display()))?;
    report.info(format!("Wrote: {}", output.display()));
    Ok(())
}
