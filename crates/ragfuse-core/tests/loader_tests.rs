use std::collections::HashSet;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

use ragfuse_core::loader::{ChunkingConfig, DocumentLoader};
use ragfuse_core::MetaValue;

#[test]
fn load_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");

    assert_eq!(docs.len(), 1, "one small paragraph becomes one document");
    assert_eq!(docs[0].id, "a:0");
    assert_eq!(docs[0].content, "Short text");
    assert_eq!(docs[0].metadata.get("category"), Some(&MetaValue::from("misc")));
}

#[test]
fn paragraphs_become_separate_documents_with_category() {
    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("animals");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("pets.txt"), "cats are mammals\n\n\n\ndogs are mammals").unwrap();

    let docs = DocumentLoader::new().load_directory(tmp.path()).expect("load");

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["animals/pets:0", "animals/pets:1"]);
    assert!(docs.iter().all(|d| d.metadata.get("category") == Some(&MetaValue::from("animals"))));
    assert_eq!(docs[1].metadata.get("chunk_index"), Some(&MetaValue::Integer(1)));
}

#[test]
fn long_paragraph_is_split_with_overlap() {
    let tmp = TempDir::new().unwrap();
    let words: Vec<String> = (0..25).map(|i| format!("w{i}")).collect();
    fs::write(tmp.path().join("long.txt"), words.join(" ")).unwrap();

    let loader = DocumentLoader::with_chunking(ChunkingConfig { max_tokens: 5, window_words: 10, overlap_percent: 0.2 });
    let docs = loader.load_directory(tmp.path()).expect("load");

    assert_eq!(docs.len(), 3);
    assert!(docs[0].content.starts_with("w0 "));
    assert!(docs[1].content.starts_with("w8 "), "window overlaps by two words");
    assert!(docs[2].content.ends_with("w24"));
}

#[test]
fn load_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let docs = DocumentLoader::new().load_directory_limited(dir, 1).expect("load limited");

    let stems: HashSet<String> = docs.iter().map(|d| d.id.split(':').next().unwrap().to_string()).collect();
    assert_eq!(stems.len(), 1, "limited to one source file");
}

#[test]
fn empty_directory_yields_no_documents() {
    let tmp = TempDir::new().unwrap();
    let docs = DocumentLoader::new().load_directory(tmp.path()).expect("load");
    assert!(docs.is_empty());
}

#[test]
fn same_file_name_in_different_categories_gets_distinct_ids() {
    let tmp = TempDir::new().unwrap();
    for (category, text) in [("hr", "vacation policy"), ("eng", "deploy checklist")] {
        let sub = tmp.path().join(category);
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("notes.txt"), text).unwrap();
    }

    let docs = DocumentLoader::new().load_directory(tmp.path()).expect("load");

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["eng/notes:0", "hr/notes:0"]);
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), docs.len());
}
