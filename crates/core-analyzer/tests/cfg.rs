mod common;

use common::{CODE_BASE, addr, fixture};
use core_analyzer::AnalyzerError;

#[test]
fn conditional_splits_into_three_blocks() {
    // 0x100 jnz +1 -> 0x103 ; 0x102 ret ; 0x103 nop ; 0x104 ret
    let fx = fixture(&[0x75, 0x01, 0x00, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    let graph = fx
        .analyzer
        .build_control_flow_graph(&fx.document, addr(CODE_BASE))
        .unwrap();

    assert_eq!(graph.entry(), addr(CODE_BASE));
    assert_eq!(graph.blocks().len(), 3);

    let entry = graph.block_of(&addr(0x100)).unwrap();
    let fallthrough = graph.block_of(&addr(0x102)).unwrap();
    let taken = graph.block_of(&addr(0x103)).unwrap();
    let edges: Vec<_> = graph.edges().collect();
    assert!(edges.contains(&(entry, fallthrough)));
    assert!(edges.contains(&(entry, taken)));
    assert_eq!(edges.len(), 2);

    // The taken block runs nop then ret as one straight line.
    assert_eq!(
        graph.blocks()[taken].addresses(),
        &[addr(0x103), addr(0x104)]
    );
    assert_eq!(graph.byte_size(), 5);
}

#[test]
fn loop_produces_back_edge() {
    // 0x100 nop ; 0x101 jnz -3 -> 0x100 ; 0x103 ret
    let fx = fixture(&[0x90, 0x75, 0xFD, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    let graph = fx
        .analyzer
        .build_control_flow_graph(&fx.document, addr(CODE_BASE))
        .unwrap();

    let head = graph.block_of(&addr(0x100)).unwrap();
    let exit = graph.block_of(&addr(0x103)).unwrap();
    let latch = graph.block_of(&addr(0x101)).unwrap();
    // nop and jnz share a block only if nop is not a separate leader;
    // the back edge makes 0x100 a leader, so the latch follows it.
    assert_eq!(head, latch);
    let edges: Vec<_> = graph.edges().collect();
    assert!(edges.contains(&(head, head)), "expected the back edge");
    assert!(edges.contains(&(head, exit)));
}

#[test]
fn call_does_not_end_a_block() {
    // 0x100 call +2 -> 0x104 ; 0x102 nop ; 0x103 ret ; 0x104 ret
    let fx = fixture(&[0xE8, 0x02, 0x90, 0x00, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));
    let graph = fx
        .analyzer
        .build_control_flow_graph(&fx.document, addr(CODE_BASE))
        .unwrap();

    // call, nop, ret all belong to the entry block; the callee body is
    // a separate function and not part of this graph.
    assert_eq!(graph.blocks().len(), 1);
    assert_eq!(
        graph.blocks()[0].addresses(),
        &[addr(0x100), addr(0x102), addr(0x103)]
    );
}

#[test]
fn missing_function_is_reported() {
    let fx = fixture(&[0x90, 0x00]);
    let err = fx
        .analyzer
        .build_control_flow_graph(&fx.document, addr(CODE_BASE))
        .unwrap_err();
    assert_eq!(err, AnalyzerError::NoSuchFunction);
}
