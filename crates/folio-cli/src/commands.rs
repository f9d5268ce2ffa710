use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{bail, Context};
use colored::Colorize;
use folio_sdk::{
    DeserializeOptions, RequestContext, RevisionMeta, Right, StoreOptions, Wiki, WikiConfig,
    WhichIndex,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = WikiConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let wiki = Wiki::new(config)?;
    match cli.command {
        Command::Storage { action } => cmd_storage(&wiki, action),
        Command::Index { action } => cmd_index(&wiki, action),
        Command::Save(args) => cmd_save(&wiki, args),
        Command::Load(args) => cmd_load(&wiki, args),
        Command::Item { action } => cmd_item(&wiki, action),
        Command::Acl { action } => cmd_acl(&wiki, action),
    }
}

fn context(user: &UserArgs) -> RequestContext {
    match &user.user {
        Some(name) => RequestContext::user(name.clone()),
        None => RequestContext::anonymous(),
    }
}

fn cmd_storage(wiki: &Wiki, action: StorageAction) -> anyhow::Result<()> {
    match action {
        StorageAction::Create => {
            wiki.backend().create()?;
            println!("{} Storage created.", "✓".green().bold());
        }
        StorageAction::Destroy => {
            wiki.backend().destroy()?;
            println!("{} Storage destroyed.", "✓".green().bold());
        }
    }
    Ok(())
}

fn cmd_index(wiki: &Wiki, action: IndexAction) -> anyhow::Result<()> {
    let indexer = wiki.indexer();
    wiki.backend().open()?;
    match action {
        IndexAction::Create(args) => {
            indexer.create(args.tmp)?;
            println!("{} Index created{}.", "✓".green().bold(), tmp_label(args.tmp));
        }
        IndexAction::Destroy(args) => {
            indexer.destroy(args.tmp)?;
            println!("{} Index destroyed{}.", "✓".green().bold(), tmp_label(args.tmp));
        }
        IndexAction::Build(args) => {
            indexer.rebuild(args.tmp)?;
            let count = indexer.dump(args.tmp, WhichIndex::AllRevs)?.len();
            println!(
                "{} Indexed {} revisions{}.",
                "✓".green().bold(),
                count.to_string().bold(),
                tmp_label(args.tmp)
            );
        }
        IndexAction::Update(args) => {
            if indexer.update(args.tmp)? {
                println!("{} Index updated{}.", "✓".green().bold(), tmp_label(args.tmp));
            } else {
                println!("Index already up to date{}.", tmp_label(args.tmp));
            }
        }
        IndexAction::Move => {
            indexer.move_index()?;
            println!("{} Temporary index moved into place.", "✓".green().bold());
        }
        IndexAction::Optimize(args) => {
            indexer.optimize_index(args.tmp)?;
            println!("{} Index optimized{}.", "✓".green().bold(), tmp_label(args.tmp));
        }
        IndexAction::Dump(args) => {
            let which = if args.all { WhichIndex::AllRevs } else { WhichIndex::LatestRevs };
            for doc in indexer.dump(args.tmp, which)? {
                println!(
                    "{}  {}  {:>8}  {}",
                    doc.revid.short().yellow(),
                    doc.mtime.to_string().dimmed(),
                    doc.size,
                    fqname(&doc.namespace, doc.name.first().map(String::as_str).unwrap_or("")),
                );
            }
        }
    }
    Ok(())
}

fn tmp_label(tmp: bool) -> &'static str {
    if tmp {
        " (temporary)"
    } else {
        ""
    }
}

fn fqname(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

fn cmd_save(wiki: &Wiki, args: SaveArgs) -> anyhow::Result<()> {
    wiki.backend().open()?;
    let file = File::create(&args.file).with_context(|| format!("creating {}", args.file.display()))?;
    let stats = wiki.save(&mut BufWriter::new(file))?;
    println!(
        "{} Saved {} revisions ({} bytes) to {}",
        "✓".green().bold(),
        stats.revisions.to_string().bold(),
        stats.payload_bytes,
        args.file.display()
    );
    Ok(())
}

fn cmd_load(wiki: &Wiki, args: LoadArgs) -> anyhow::Result<()> {
    let rename_ns = match args.rename_ns.as_deref() {
        Some(spec) => match spec.split_once(':') {
            Some((old, new)) => Some((old.to_string(), new.to_string())),
            None => bail!("--rename-ns expects OLD:NEW, got {spec:?}"),
        },
        None => None,
    };
    let options = DeserializeOptions {
        rename_ns,
        kill_ns: args.kill_ns,
    };
    wiki.backend().open()?;
    let file = File::open(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let stats = wiki.load(&mut BufReader::new(file), &options)?;
    println!(
        "{} Loaded {} revisions, skipped {}; index rebuilt.",
        "✓".green().bold(),
        stats.stored.to_string().bold(),
        stats.skipped
    );
    Ok(())
}

fn cmd_item(wiki: &Wiki, action: ItemAction) -> anyhow::Result<()> {
    wiki.open()?;
    match action {
        ItemAction::Show { fqname, user } => {
            let gate = wiki.protector(context(&user));
            let item = gate.lookup(&fqname)?;
            let Some(rev) = item.current() else {
                bail!("item {fqname} does not exist");
            };
            let meta = rev.meta()?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            let data = rev.read_data()?;
            match std::str::from_utf8(&data) {
                Ok(text) if meta.contenttype.as_deref().is_some_and(|ct| ct.starts_with("text/")) => {
                    println!("\n{text}");
                }
                _ => println!("\n{} bytes of {}", data.len(), meta.contenttype.unwrap_or_default().cyan()),
            }
        }
        ItemAction::Put {
            fqname,
            file,
            contenttype,
            comment,
            user,
        } => {
            let gate = wiki.protector(context(&user));
            let mut item = gate.lookup(&fqname)?;
            let meta = RevisionMeta {
                contenttype: Some(contenttype),
                comment,
                acl: item.acl().map(str::to_string),
                ..RevisionMeta::default()
            };
            let mut data = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);
            let rev = item.store_revision(meta, &mut data, &StoreOptions::default())?;
            println!("{} Stored {} as {}", "✓".green().bold(), fqname.bold(), rev.revid().short().yellow());
        }
        ItemAction::History { fqname, user } => {
            let gate = wiki.protector(context(&user));
            let item = gate.lookup(&fqname)?;
            for rev in item.iter_revisions()? {
                let meta = rev.meta()?;
                println!(
                    "{}  {}  {}  {}",
                    rev.revid().short().yellow(),
                    rev.mtime().to_string().dimmed(),
                    meta.action.map(|a| a.to_string()).unwrap_or_default().cyan(),
                    meta.comment.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn cmd_acl(wiki: &Wiki, action: AclAction) -> anyhow::Result<()> {
    wiki.open()?;
    match action {
        AclAction::Check { fqname, right, user } => {
            let right: Right = right.parse().map_err(anyhow::Error::msg)?;
            let gate = wiki.protector(context(&user));
            if gate.may(&fqname, right)? {
                println!("{} {right} allowed on {}", "✓".green().bold(), fqname.bold());
            } else {
                println!("{} {right} denied on {}", "✗".red().bold(), fqname.bold());
            }
        }
        AclAction::Show { fqname } => {
            let gate = wiki.protector(RequestContext::anonymous());
            for acl in gate.lookup(&fqname)?.full_acls()? {
                println!("{}", acl.trim());
            }
        }
    }
    Ok(())
}
