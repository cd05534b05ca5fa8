//! Collates SARS-CoV-2 sequencing exports and patient metadata into the
//! `sequences.fasta` and `metadata.tsv` pair a Nextstrain build consumes.

pub mod catalog;
pub mod collate;
pub mod config;
pub mod dates;
pub mod domain;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod reader;
pub mod resolver;
pub mod sequence;
pub mod table;
pub mod writer;
