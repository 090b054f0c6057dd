//! Inspection of compiled kernel objects.
//!
//! The driver returns raw object bytes; [`ObjectSummary`] parses them with the
//! `object` crate so callers can confirm that every kernel function they emitted
//! ended up as a defined symbol.

use std::fmt;

use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use super::error::ToolchainResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedSymbol {
    pub name: String,
    pub size: u64,
    pub kind: SymbolKind,
    pub global: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub format: object::BinaryFormat,
    pub architecture: object::Architecture,
    /// `(name, size)` of every named section.
    pub sections: Vec<(String, u64)>,
    pub symbols: Vec<DefinedSymbol>,
}

impl ObjectSummary {
    pub fn parse(bytes: &[u8]) -> ToolchainResult<Self> {
        let file = object::File::parse(bytes)?;

        let sections = file
            .sections()
            .filter_map(|s| {
                let name = s.name().ok()?;
                (!name.is_empty()).then(|| (name.to_string(), s.size()))
            })
            .collect();

        let symbols = file
            .symbols()
            .filter(|s| s.is_definition())
            .filter_map(|s| {
                let name = s.name().ok()?;
                (!name.is_empty()).then(|| DefinedSymbol {
                    name: name.to_string(),
                    size: s.size(),
                    kind: s.kind(),
                    global: s.is_global(),
                })
            })
            .collect();

        Ok(Self {
            format: file.format(),
            architecture: file.architecture(),
            sections,
            symbols,
        })
    }

    pub fn symbol(&self, name: &str) -> Option<&DefinedSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Names from `expected` with no defined symbol, in input order.
    pub fn missing_symbols<'a, I>(&self, expected: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        expected
            .into_iter()
            .filter(|name| self.symbol(name).is_none())
            .collect()
    }
}

impl fmt::Display for ObjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Object: {:?} ({:?})", self.format, self.architecture)?;
        writeln!(f, "  Sections:")?;
        for (name, size) in &self.sections {
            writeln!(f, "    {:<24} {} bytes", name, size)?;
        }
        writeln!(f, "  Defined symbols:")?;
        for sym in &self.symbols {
            writeln!(
                f,
                "    {:<24} {:?} {} bytes{}",
                sym.name,
                sym.kind,
                sym.size,
                if sym.global { "" } else { " (local)" }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::ToolchainError;
    use object::write::{Object as ObjectWriter, StandardSection, Symbol, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolScope};

    fn elf_with_functions(names: &[&str]) -> Vec<u8> {
        let mut obj = ObjectWriter::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.section_id(StandardSection::Text);
        for name in names {
            let offset = obj.append_section_data(text, &[0xc3], 1);
            obj.add_symbol(Symbol {
                name: name.as_bytes().to_vec(),
                value: offset,
                size: 1,
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }
        obj.write().unwrap()
    }

    #[test]
    fn test_summary_lists_kernels() {
        let bytes = elf_with_functions(&["vector_add", "tiled_add"]);
        let summary = ObjectSummary::parse(&bytes).unwrap();
        assert_eq!(summary.format, BinaryFormat::Elf);
        assert!(summary.sections.iter().any(|(name, _)| name == ".text"));

        let sym = summary.symbol("vector_add").unwrap();
        assert_eq!(sym.kind, SymbolKind::Text);
        assert!(sym.global);
        assert_eq!(
            summary.missing_symbols(["vector_add", "dma_copy", "tiled_add"]),
            vec!["dma_copy"]
        );
        assert!(summary.to_string().contains("tiled_add"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            ObjectSummary::parse(b"not an object"),
            Err(ToolchainError::ObjectParse(_))
        ));
    }
}
