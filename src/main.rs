use std::{env, fs::File, io, process::ExitCode};

use tupledb::{
    config::DEFAULT_PAGE_SIZE,
    paging::{reader::TupleReader, text::TextTupleWriter},
    Database, DbError,
};

const USAGE: &str = "usage:
    tupledb index <db-dir>                  build every index in index_info.txt
    tupledb dump <relation-file> [page-size] print tuples as comma separated lines";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let result = match args[..] {
        ["index", dir] => build_indexes(dir),
        ["dump", file] => dump(file, DEFAULT_PAGE_SIZE),
        ["dump", file, page_size] => match page_size.parse() {
            Ok(page_size) => dump(file, page_size),
            Err(_) => Err(DbError::Other(format!("invalid page size '{page_size}'"))),
        },
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn build_indexes(dir: &str) -> tupledb::Result<()> {
    let db = Database::open(dir)?;
    db.build_indexes()?;

    for index in db.catalog.all_indexes() {
        eprintln!("{}", index.path.display());
    }

    Ok(())
}

fn dump(file: &str, page_size: usize) -> tupledb::Result<()> {
    let mut reader = TupleReader::<File>::open(file, page_size)?;
    let mut writer = TextTupleWriter::new(io::stdout().lock());

    while let Some(tuple) = reader.try_next()? {
        writer.write_tuple(&tuple)?;
    }

    writer.close()
}
