//! Snapshot tests for extinit-save
//!
//! Covers:
//! - initializer layout of a saved model with threshold and alignment
//! - composite naming and layout with prepacked constants
//! - default `SaveConfig` TOML rendering
use extinit_graph::fixtures::{matmul_nbits_like, mnist_like, patterned, write_definition};
use extinit_graph::{DataLocation, ElementType, Model};
use extinit_save::{
    OffsetAlignmentInfo, PrepackTable, SaveConfig, SaveOptions, SaveSummary,
    save_with_external_initializers,
};
use tempfile::TempDir;

/// One line per initializer plus the summary.
fn render(saved: &Model, summary: &SaveSummary) -> String {
    let mut lines: Vec<String> = saved
        .initializers()
        .iter()
        .map(|def| {
            let mut line = format!("{} {} {:?}", def.name, def.data_type, def.dims);
            match def.data_location {
                DataLocation::Default => line.push_str(" DEFAULT"),
                DataLocation::External => line.push_str(&format!(
                    " EXTERNAL {}@{}+{}",
                    def.external_data_entry("location").unwrap_or("?"),
                    def.external_data_entry("offset").unwrap_or("?"),
                    def.external_data_entry("length").unwrap_or("?"),
                )),
            }
            line
        })
        .collect();
    lines.push(format!(
        "summary: in={} out={} inline={} external={} prepacked={} bytes={} padding={}",
        summary.initializers_in,
        summary.initializers_out,
        summary.inline,
        summary.external,
        summary.prepacked,
        summary.external_bytes,
        summary.padding_bytes
    ));
    lines.join("\n")
}

#[test]
fn aligned_layout() {
    let dir = TempDir::new().unwrap();
    let source = Model::load(write_definition(dir.path(), "source.json", &mnist_like()).unwrap())
        .unwrap();
    let out = dir.path().join("model.json");
    let options = SaveOptions {
        size_threshold: 100,
        alignment: OffsetAlignmentInfo::aligned(64),
        save_prepacked_as_constants: false,
    };
    let summary =
        save_with_external_initializers(&source, &out, "model.bin", &options, None).unwrap();

    let layout = render(&Model::load(&out).unwrap(), &summary);
    insta::assert_snapshot!("aligned_layout", layout);
}

#[test]
fn prepacked_layout() {
    let dir = TempDir::new().unwrap();
    let source =
        Model::load(write_definition(dir.path(), "source.json", &matmul_nbits_like()).unwrap())
            .unwrap();
    let out = dir.path().join("model.json");
    let mut table = PrepackTable::new();
    table
        .insert("MatMul.Weight", "MatMul_0", patterned("w", ElementType::Uint8, &[178], 1))
        .unwrap();
    table.insert("scales", "MatMul_0", patterned("s", ElementType::Float, &[178], 2)).unwrap();
    let options =
        SaveOptions { size_threshold: 100, save_prepacked_as_constants: true, ..Default::default() };
    let summary =
        save_with_external_initializers(&source, &out, "model.bin", &options, Some(&table))
            .unwrap();

    let layout = render(&Model::load(&out).unwrap(), &summary);
    insta::assert_snapshot!("prepacked_layout", layout);
}

#[test]
fn default_config_toml() {
    let toml = SaveConfig::default().to_toml().unwrap();
    insta::assert_snapshot!("default_config_toml", toml);
}
