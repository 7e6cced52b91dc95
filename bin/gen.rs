use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use clap::{Arg, Command};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

const BATCH_ROWS: u64 = 10_000;

/// Writes a synthetic product dump shaped like the real one: nullable codes,
/// repeated codes, list-valued names and dict-like ingredient strings.
fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("food.parquet"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let output = matches.get_one::<PathBuf>("output").unwrap();

    let schema = schema();
    let mut writer = ArrowWriter::try_new(File::create(output)?, schema.clone(), None)?;
    let mut start = 0;
    while start < rows {
        let end = (start + BATCH_ROWS).min(rows);
        writer.write(&build_batch(&schema, start..end)?)?;
        start = end;
    }
    writer.close()?;

    println!("wrote {} rows to {}", rows, output.display());
    Ok(())
}

fn schema() -> SchemaRef {
    let item = Arc::new(Field::new("item", DataType::Utf8, true));
    Arc::new(Schema::new(vec![
        Field::new("code", DataType::Utf8, true),
        Field::new("product_name", DataType::List(item), true),
        Field::new("ingredients_text", DataType::Utf8, true),
    ]))
}

fn build_batch(schema: &SchemaRef, range: std::ops::Range<u64>) -> anyhow::Result<RecordBatch> {
    let mut codes = StringBuilder::new();
    let mut names = ListBuilder::new(StringBuilder::new());
    let mut ingredients = StringBuilder::new();

    for i in range {
        // every 50th code is missing, every 10th repeats the previous one
        match i {
            i if i % 50 == 49 => codes.append_null(),
            i if i % 10 == 9 => codes.append_value(format!("{:013}", i - 1)),
            i => codes.append_value(format!("{:013}", i)),
        }

        if i % 3 == 0 {
            names
                .values()
                .append_value(format!("{{'lang': 'main', 'text': 'Product {i}'}}"));
        } else {
            names.values().append_value(format!("Product {i}"));
        }
        names.append(true);

        match i % 4 {
            0 => ingredients.append_value(format!("{{'lang': 'en', 'text': 'sugar, water, salt {i}'}}")),
            1 => ingredients.append_value(format!(r#"{{"lang": "en", "text": "flour, yeast {i}"}}"#)),
            2 => ingredients.append_value(format!("milk, cocoa {i}")),
            _ => ingredients.append_null(),
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(codes.finish()),
        Arc::new(names.finish()),
        Arc::new(ingredients.finish()),
    ];
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}
