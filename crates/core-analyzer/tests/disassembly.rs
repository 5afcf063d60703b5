mod common;

use common::{CODE_BASE, ToyArch, addr, fixture};
use core_document::XRefKind;

#[test]
fn jump_skips_unreachable_bytes() {
    // 0x100 mov r1, 0x2a ; 0x103 jmp +1 -> 0x106 ; 0x105 junk ;
    // 0x106 nop ; 0x107 ret
    let fx = fixture(&[0xB0, 0x01, 0x2A, 0xEB, 0x01, 0xFF, 0x90, 0x00]);
    let result = fx
        .analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    assert_eq!(result.decoded, 4);
    for offset in [0x100, 0x103, 0x106, 0x107] {
        assert!(
            fx.document.has_instruction_at(&addr(offset)),
            "expected an instruction at {offset:#x}"
        );
    }
    assert!(fx.document.cell(&addr(0x105)).is_none());
    assert_eq!(
        fx.document.cross_references_from(&addr(0x103)),
        vec![(addr(0x106), XRefKind::Branch)]
    );
    assert_eq!(
        fx.document.cross_references_to(&addr(0x106)),
        vec![(addr(0x103), XRefKind::Branch)]
    );
}

#[test]
fn second_run_adds_nothing() {
    let fx = fixture(&[0xB0, 0x01, 0x2A, 0xEB, 0x01, 0xFF, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    fx.analyzer
        .create_function(&fx.document, addr(CODE_BASE))
        .unwrap();
    let before = fx.document.stats();

    let rerun = fx
        .analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    assert_eq!(rerun.decoded, 0);
    assert!(rerun.callees.is_empty());
    assert_eq!(fx.document.stats(), before);
}

#[test]
fn undecodable_entry_becomes_a_data_byte() {
    let fx = fixture(&[0xFF, 0x00]);
    let result = fx
        .analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    assert_eq!(result.decoded, 0);
    let cell = fx.document.cell(&addr(CODE_BASE)).unwrap();
    assert!(!cell.is_instruction());
    assert_eq!(cell.length(), 1);
}

#[test]
fn call_targets_are_reported_as_fresh_entries() {
    // 0x100 call +2 -> 0x104 ; 0x102 ret ; 0x103 junk ; 0x104 nop ;
    // 0x105 ret
    let fx = fixture(&[0xE8, 0x02, 0x00, 0xFF, 0x90, 0x00]);
    let result = fx
        .analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    assert_eq!(result.callees, vec![addr(0x104)]);
    assert_eq!(
        fx.document.cross_references_from(&addr(0x100)),
        vec![(addr(0x104), XRefKind::Call)]
    );
    // The caller keeps decoding past the call...
    assert!(fx.document.has_instruction_at(&addr(0x102)));
    // ...but the callee body waits for its own pass.
    assert!(!fx.document.has_instruction_at(&addr(0x104)));

    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(0x104));
    assert!(fx.document.has_instruction_at(&addr(0x104)));
    assert!(fx.document.has_instruction_at(&addr(0x105)));
}

#[test]
fn conditional_jump_decodes_both_paths() {
    // 0x100 jnz +1 -> 0x103 ; 0x102 ret ; 0x103 nop ; 0x104 ret
    let fx = fixture(&[0x75, 0x01, 0x00, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    for offset in [0x100, 0x102, 0x103, 0x104] {
        assert!(fx.document.has_instruction_at(&addr(offset)));
    }
}

#[test]
fn backward_jump_terminates() {
    // 0x100 nop ; 0x101 jmp -3 -> 0x100
    let fx = fixture(&[0x90, 0xEB, 0xFD]);
    let result = fx
        .analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    assert_eq!(result.decoded, 2);
    assert_eq!(
        fx.document.cross_references_from(&addr(0x101)),
        vec![(addr(0x100), XRefKind::Branch)]
    );
}

#[test]
fn function_annotation_labels_the_entry() {
    let fx = fixture(&[0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    fx.analyzer
        .create_function(&fx.document, addr(CODE_BASE))
        .unwrap();

    let multicell = fx.document.multi_cell(&addr(CODE_BASE)).unwrap();
    assert!(multicell.is_function());
    assert_eq!(multicell.size(), 2);
    assert_eq!(
        fx.document.label_at(&addr(CODE_BASE)).unwrap().name(),
        "fcn_100"
    );
}

#[test]
fn existing_label_is_preserved_by_function_annotation() {
    use core_document::{Label, LabelKind};
    let fx = fixture(&[0x90, 0x00]);
    fx.document
        .add_label(addr(CODE_BASE), Label::new("start", LabelKind::Code))
        .unwrap();
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    fx.analyzer
        .create_function(&fx.document, addr(CODE_BASE))
        .unwrap();
    assert_eq!(
        fx.document.label_at(&addr(CODE_BASE)).unwrap().name(),
        "start"
    );
}

#[test]
fn toy_arch_rejects_truncated_instructions() {
    use core_binary::BinaryStream;
    use core_plugin::Architecture as _;
    let stream = BinaryStream::from_bytes(&[0xB0, 0x01]);
    assert!(ToyArch.disassemble(&stream, 0, 0).is_none());
}
