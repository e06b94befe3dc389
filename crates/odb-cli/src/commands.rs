use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use odb_database::{Database, DatabaseConfig};
use odb_store::{FsStorage, Object, ObjectKind, RawObject, Tree};
use odb_types::ObjectId;
use serde_json::json;

use crate::cli::*;

type Db = Database<FsStorage>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)?;
    out.flush()?;
    Ok(())
}

pub fn execute(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => DatabaseConfig::from_file(path)?,
        None => DatabaseConfig::default(),
    };
    let db = Database::with_config(Arc::new(FsStorage::new(&cli.repo)), config)?;
    let format = cli.format;

    match cli.command {
        Command::Init => cmd_init(&db, &cli.repo, format, out),
        Command::HashObject(args) => cmd_hash_object(&db, args, format, out),
        Command::CatFile(args) => cmd_cat_file(&db, args, format, out),
        Command::RevParse(args) => {
            let id = resolve(&db, &args.rev)?;
            emit_id(id, format, out)
        }
        Command::UpdateRef(args) => cmd_update_ref(&db, args, format, out),
        Command::SymbolicRef(args) => cmd_symbolic_ref(&db, args, format, out),
        Command::LsTree(args) => cmd_ls_tree(&db, args, format, out),
        Command::ShowRef(args) => cmd_show_ref(&db, args, format, out),
    }
}

fn resolve(db: &Db, rev: &str) -> anyhow::Result<ObjectId> {
    db.resolve(rev)?
        .ok_or_else(|| anyhow!("unknown revision: {rev}"))
}

fn load(db: &Db, rev: &str) -> anyhow::Result<(ObjectId, RawObject)> {
    let id = resolve(db, rev)?;
    let raw = db
        .load_raw(&id)?
        .ok_or_else(|| anyhow!("object {id} not found"))?;
    Ok((id, raw))
}

fn emit_id(id: ObjectId, format: OutputFormat, out: &mut impl Write) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => writeln!(out, "{id}")?,
        OutputFormat::Json => writeln!(out, "{}", json!({ "id": id }))?,
    }
    Ok(())
}

fn cmd_init(db: &Db, path: &Path, format: OutputFormat, out: &mut impl Write) -> anyhow::Result<()> {
    db.init()?;
    match format {
        OutputFormat::Text => writeln!(
            out,
            "{} Initialized object database in {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        )?,
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({ "path": path.display().to_string(), "head": odb_database::DEFAULT_BRANCH })
        )?,
    }
    Ok(())
}

fn cmd_hash_object(
    db: &Db,
    args: HashObjectArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let kind: ObjectKind = args.kind.parse()?;
    let body = if args.file.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(&args.file)
            .with_context(|| format!("failed to read {}", args.file.display()))?
    };

    let id = if args.write {
        db.save_raw(kind, &body)?
    } else {
        RawObject::new(kind, body).compute_id()
    };
    emit_id(id, format, out)
}

fn cmd_cat_file(
    db: &Db,
    args: CatFileArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (id, raw) = load(db, &args.rev)?;

    if args.mode.kind {
        match format {
            OutputFormat::Text => writeln!(out, "{}", raw.kind)?,
            OutputFormat::Json => writeln!(out, "{}", json!({ "id": id, "type": raw.kind }))?,
        }
    } else if args.mode.size {
        match format {
            OutputFormat::Text => writeln!(out, "{}", raw.body.len())?,
            OutputFormat::Json => {
                writeln!(out, "{}", json!({ "id": id, "size": raw.body.len() }))?
            }
        }
    } else {
        match format {
            OutputFormat::Json => {
                let object = raw.decode()?;
                writeln!(out, "{}", serde_json::to_string_pretty(&object)?)?;
            }
            OutputFormat::Text if raw.kind == ObjectKind::Tree => {
                let object = raw.decode()?;
                let tree = object.as_tree().ok_or_else(|| anyhow!("object is not a tree"))?;
                write_tree(tree, out)?;
            }
            OutputFormat::Text => out.write_all(&raw.body)?,
        }
    }
    Ok(())
}

fn cmd_update_ref(
    db: &Db,
    args: UpdateRefArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let id = resolve(db, &args.rev)?;
    db.set_ref(&args.name, &id)?;
    match format {
        OutputFormat::Text => writeln!(
            out,
            "{} {} -> {}",
            "✓".green().bold(),
            args.name.yellow(),
            id.short_hex()
        )?,
        OutputFormat::Json => writeln!(out, "{}", json!({ "ref": args.name, "id": id }))?,
    }
    Ok(())
}

fn cmd_symbolic_ref(
    db: &Db,
    args: SymbolicRefArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    if let Some(target) = args.target {
        db.update_head(&target)?;
    }
    let head = db.get_head()?.ok_or_else(|| anyhow!("HEAD does not exist"))?;
    match format {
        OutputFormat::Text => writeln!(out, "{head}")?,
        OutputFormat::Json => writeln!(out, "{}", json!({ "head": head }))?,
    }
    Ok(())
}

fn cmd_ls_tree(
    db: &Db,
    args: LsTreeArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (id, raw) = load(db, &args.rev)?;
    let tree = match raw.decode()? {
        Object::Tree(tree) => tree,
        Object::Commit(commit) => match db.load_as(ObjectKind::Tree, &commit.tree)? {
            Some(Object::Tree(tree)) => tree,
            _ => bail!("tree {} of commit {id} not found", commit.tree),
        },
        other => bail!("{id} is a {}, not a tree or commit", other.kind()),
    };
    match format {
        OutputFormat::Text => write_tree(&tree, out)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&tree)?)?,
    }
    Ok(())
}

fn write_tree(tree: &Tree, out: &mut impl Write) -> io::Result<()> {
    for entry in tree.entries() {
        writeln!(
            out,
            "{} {} {}\t{}",
            entry.mode,
            entry.mode.object_kind(),
            entry.hash,
            entry.name
        )?;
    }
    Ok(())
}

fn cmd_show_ref(
    db: &Db,
    args: ShowRefArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let refs = db.list_refs(&args.prefix)?;
    match format {
        OutputFormat::Text => {
            for (name, id) in &refs {
                writeln!(out, "{id} {name}")?;
            }
        }
        OutputFormat::Json => {
            let refs: Vec<_> = refs
                .iter()
                .map(|(name, id)| json!({ "ref": name, "id": id }))
                .collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&refs)?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(repo: &Path, args: &[&str]) -> anyhow::Result<String> {
        let repo = repo.to_str().unwrap();
        let prefix = ["odb", "-C", repo];
        let argv = prefix.iter().chain(args).copied();
        let cli = Cli::try_parse_from(argv)?;
        let mut out = Vec::new();
        execute(cli, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn init_then_symbolic_ref() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        assert!(dir.path().join("config").is_file());
        assert_eq!(run(dir.path(), &["symbolic-ref"]).unwrap(), "refs/heads/master\n");
        assert_eq!(
            run(dir.path(), &["symbolic-ref", "refs/heads/main"]).unwrap(),
            "refs/heads/main\n"
        );
    }

    #[test]
    fn hash_object_matches_git() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hello\n").unwrap();
        let file = file.to_str().unwrap();

        let out = run(dir.path(), &["hash-object", file]).unwrap();
        assert_eq!(out, "ce013625030ba8dba906f756967f9e9ca394464a\n");
        assert!(!dir.path().join("objects").exists());

        run(dir.path(), &["hash-object", "-w", file]).unwrap();
        assert_eq!(
            run(dir.path(), &["cat-file", "-p", "ce013625030ba8dba906f756967f9e9ca394464a"]).unwrap(),
            "hello\n"
        );
        assert_eq!(
            run(dir.path(), &["cat-file", "-t", "ce013625030ba8dba906f756967f9e9ca394464a"]).unwrap(),
            "blob\n"
        );
        assert_eq!(
            run(dir.path(), &["cat-file", "-s", "ce013625030ba8dba906f756967f9e9ca394464a"]).unwrap(),
            "6\n"
        );
    }

    #[test]
    fn refs_and_trees() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path());
        db.init().unwrap();
        let blob = db.save_raw(ObjectKind::Blob, b"data").unwrap();
        let tree = Tree::new(vec![odb_store::TreeEntry::new(
            odb_store::EntryMode::Regular,
            "file.txt",
            blob,
        )])
        .unwrap();
        let tree_id = db.save_as(&Object::Tree(tree)).unwrap();

        run(dir.path(), &["update-ref", "refs/heads/master", &tree_id.to_hex()]).unwrap();
        assert_eq!(run(dir.path(), &["rev-parse", "master"]).unwrap(), format!("{tree_id}\n"));
        assert_eq!(
            run(dir.path(), &["ls-tree", "HEAD"]).unwrap(),
            format!("100644 blob {blob}\tfile.txt\n")
        );
        assert_eq!(
            run(dir.path(), &["show-ref"]).unwrap(),
            format!("{tree_id} refs/heads/master\n")
        );

        let json = run(dir.path(), &["--format", "json", "rev-parse", "HEAD"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], tree_id.to_hex());
    }

    #[test]
    fn unknown_revision_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), &["rev-parse", "nope"]).unwrap_err();
        assert!(err.to_string().contains("unknown revision"));
    }

    #[test]
    fn ls_tree_rejects_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path());
        let blob = db.save_raw(ObjectKind::Blob, b"x").unwrap();
        assert!(run(dir.path(), &["ls-tree", &blob.to_hex()]).is_err());
    }

    #[test]
    fn config_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("odb.toml");
        std::fs::write(&config, "compression_level = 42\n").unwrap();
        let err = run(dir.path(), &["--config", config.to_str().unwrap(), "init"]).unwrap_err();
        assert!(err.to_string().contains("compression_level"));
    }
}
