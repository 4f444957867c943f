//! End-to-end scenarios exercising the pointer analysis engines and the
//! reaching-definitions/slicing pipeline through their public construction
//! and query APIs only.

use slicer_analysis::pointer::{FlowInsensitive, FlowSensitive, FlowSensitiveInvalidation};
use slicer_analysis::{slice, walk, AnalysisConfig, DefaultHooks, PointerAnalysis, ReachingDefinitionsAnalysis};
use slicer_graph::{AllocAttrs, DefSite, PointerGraph, PointerGraphBuilder, PsNodeTag, RdGraph, RdGraphBuilder, RdNodeTag};
use slicer_utils::Offset;

#[test]
fn s1_strong_update_kill() {
    let mut graph = PointerGraph::new();
    let (v1, load) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs { size: Offset::new(8), ..Default::default() }).unwrap();
        let other = b.alloc(AllocAttrs::default()).unwrap();
        let p = b.gep(a, Offset::ZERO).unwrap();
        let q = b.gep(a, Offset::new(4)).unwrap();
        let v1 = b.constant(a, Offset::ZERO).unwrap();
        let v2 = b.constant(other, Offset::ZERO).unwrap();
        b.store(v1, p).unwrap();
        b.store(v2, q).unwrap();
        let load = b.load(p).unwrap();
        (v1, load)
    };

    let mut analysis = PointerAnalysis::new(graph, AnalysisConfig::new(), FlowSensitive::new());
    analysis.run().unwrap();
    let v1_pts = analysis.graph.get(v1).unwrap().points_to.clone();
    let load_pts = analysis.graph.get(load).unwrap().points_to.clone();
    assert_eq!(load_pts, v1_pts);
}

#[test]
fn s2_memcpy_copies_pointers() {
    let mut graph = PointerGraph::new();
    let (x, y, l1, l2) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs { size: Offset::new(16), ..Default::default() }).unwrap();
        let bb = b.alloc(AllocAttrs { size: Offset::new(16), ..Default::default() }).unwrap();
        let x = b.alloc(AllocAttrs::default()).unwrap();
        let y = b.alloc(AllocAttrs::default()).unwrap();
        let x_ptr = b.constant(x, Offset::ZERO).unwrap();
        let y_ptr = b.constant(y, Offset::ZERO).unwrap();
        let gep_a0 = b.gep(a, Offset::ZERO).unwrap();
        let gep_a8 = b.gep(a, Offset::new(8)).unwrap();
        b.store(x_ptr, gep_a0).unwrap();
        b.store(y_ptr, gep_a8).unwrap();
        let a_ptr = b.constant(a, Offset::ZERO).unwrap();
        let b_ptr = b.constant(bb, Offset::ZERO).unwrap();
        b.memcpy(a_ptr, b_ptr, Offset::new(16)).unwrap();
        let gep_b0 = b.gep(bb, Offset::ZERO).unwrap();
        let gep_b8 = b.gep(bb, Offset::new(8)).unwrap();
        let l1 = b.load(gep_b0).unwrap();
        let l2 = b.load(gep_b8).unwrap();
        (x, y, l1, l2)
    };

    let mut analysis = PointerAnalysis::new(graph, AnalysisConfig::new(), FlowSensitive::new());
    analysis.run().unwrap();
    assert!(analysis.graph.get(l1).unwrap().points_to.points_to_target(x));
    assert!(analysis.graph.get(l2).unwrap().points_to.points_to_target(y));
}

#[test]
fn s3_indirect_call_splice() {
    // fn f(param) -> param { return param; }
    let mut graph = PointerGraph::new();
    let (f_entry, param, f_ret) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let entry = b.entry("f").unwrap();
        let param = b.noop().unwrap();
        let ret = b.ret(&[param]).unwrap();
        (entry, param, ret)
    };
    let callee_subgraph = graph.create_subgraph(f_entry, None).unwrap();
    graph.subgraph_mut(callee_subgraph).return_nodes.push(f_ret);
    graph.subgraph_mut(callee_subgraph).parameters.push(param);

    // fn main() { a = alloc(); fp = &f; call_func_ptr(fp, a); }
    let (a, call_fp, call_ret) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        b.entry("main").unwrap();
        let a = b.alloc(AllocAttrs::default()).unwrap();
        let fp = b.constant(f_entry, Offset::ZERO).unwrap();
        let (call_fp, call_ret) = b.call_func_ptr(fp, &[a]).unwrap();
        (a, call_fp, call_ret)
    };

    let mut analysis = PointerAnalysis::new(graph, AnalysisConfig::new(), FlowInsensitive::new());
    analysis.run().unwrap();

    assert!(analysis.graph.get(call_ret).unwrap().points_to.points_to_target(a));
    assert!(analysis.graph.get(f_entry).unwrap().base().predecessors().contains(&call_fp));
    assert!(analysis
        .graph
        .get(f_ret)
        .unwrap()
        .base()
        .successors()
        .contains(&call_ret));
}

#[test]
fn s4_free_invalidates_object_on_later_read() {
    let mut graph = PointerGraph::new();
    let (target, ptr, store) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let target = b.alloc(AllocAttrs { heap: true, ..Default::default() }).unwrap();
        let ptr = b.alloc(AllocAttrs::default()).unwrap();
        let v = b.constant(target, Offset::ZERO).unwrap();
        let store = b.store(v, ptr).unwrap();
        (target, ptr, store)
    };
    let free = graph.create_node(PsNodeTag::Free);
    graph.add_operand(free, target).unwrap();
    graph.add_successor(store, free).unwrap();
    let load = {
        let mut b = PointerGraphBuilder::new(&mut graph).resume_after(free);
        b.load(ptr).unwrap()
    };

    let config = AnalysisConfig::new().with_invalidate_nodes(true);
    let mut analysis = PointerAnalysis::new(
        graph,
        config,
        slicer_analysis::pointer::FlowSensitiveInvalidation::new(),
    );
    analysis.run().unwrap();

    let result = &analysis.graph.get(load).unwrap().points_to;
    assert!(result.points_to_target(analysis.graph.invalidated_node()));
    assert!(!result.points_to_target(target));
}

#[test]
fn s5_field_sensitivity_cutoff_saturates_offset() {
    let mut graph = PointerGraph::new();
    let gep = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs::default()).unwrap();
        b.gep(a, Offset::new(32)).unwrap()
    };

    let config = AnalysisConfig::new().with_field_sensitivity(Offset::new(16));
    let mut analysis = PointerAnalysis::new(graph, config, FlowInsensitive::new());
    analysis.run().unwrap();

    let pts = &analysis.graph.get(gep).unwrap().points_to;
    assert!(pts.iter().all(|p| p.offset.is_unknown()));
}

#[test]
fn s6_phi_saturates_past_max_set_size() {
    let mut graph = PointerGraph::new();
    let (phi, targets) = {
        let mut b = PointerGraphBuilder::new(&mut graph);
        let mut allocs = Vec::new();
        for _ in 0..4 {
            allocs.push(b.alloc(AllocAttrs::default()).unwrap());
        }
        let phi = b.phi(&allocs).unwrap();
        (phi, allocs)
    };
    let _ = targets;

    let config = AnalysisConfig::new().with_max_set_size(3);
    let mut analysis = PointerAnalysis::new(graph, config, FlowInsensitive::new());
    analysis.run().unwrap();

    let pts = &analysis.graph.get(phi).unwrap().points_to;
    assert_eq!(pts.len(), 1);
    assert!(pts.points_to_target(analysis.graph.unknown_node()));
    assert!(analysis.diagnostics.is_sound());
    assert!(!analysis.diagnostics.warnings.is_empty());
}

#[test]
fn backward_slice_keeps_only_the_defining_store() {
    let mut graph = RdGraph::new();
    let target = graph.create_node(RdNodeTag::Alloc);
    let ds = DefSite::new(target, Offset::ZERO, Offset::new(4));
    let (store, noop, load) = {
        let mut b = RdGraphBuilder::new(&mut graph, true);
        let store = b.store(ds).unwrap();
        let noop = b.push(RdNodeTag::Noop).unwrap();
        let load = b.load(ds).unwrap();
        (store, noop, load)
    };

    let mut rda = ReachingDefinitionsAnalysis::new(graph, AnalysisConfig::new());
    rda.run().unwrap();
    walk::mark(&mut rda, &vec![load], 1, walk::SliceDirection::Backward).unwrap();

    let mut hooks = DefaultHooks;
    let stats = slice(&mut rda.graph, 1, &mut hooks).unwrap();

    assert!(rda.graph.get(store).is_ok());
    assert!(rda.graph.get(load).is_ok());
    assert!(rda.graph.get(noop).is_err());
    assert_eq!(stats.nodes_removed, 1);
}
