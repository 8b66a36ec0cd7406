use std::{collections::HashMap, sync::Arc};

use chunkgraph::array::{concatenate, stack, store, Array, Index};
use chunkgraph::block::{BinaryOp, Block, DataType};
use chunkgraph::chunks::{blockdims_from_blockshape, normalize_chunks, ChunkDimension};
use chunkgraph::config::{ComputeConfig, ComputeConfigBuilder, SchedulerKind};
use chunkgraph::graph::{GraphKey, Operation, Task, TaskArg};
use chunkgraph::source::{ArrayLike, ArrayStore, MemoryStore, SourceLock};
use chunkgraph::top::{top, TopArg};

fn arange_block(shape: &[usize], offset: i64) -> Block {
    let n: usize = shape.iter().product();
    Block::from_vec(shape, (offset..offset + n as i64).collect()).unwrap()
}

fn arange(shape: &[usize], chunks: impl Into<chunkgraph::chunks::ChunksArg>) -> Array {
    Array::from_block(arange_block(shape, 0), chunks).unwrap()
}

fn assert_chunk_invariants(array: &Array) {
    for (axis, chunks) in array.chunks().iter().enumerate() {
        assert_eq!(chunks.iter().sum::<usize>(), array.shape()[axis]);
    }
    assert_eq!(
        array.keys().flatten().len(),
        array.numblocks().iter().product::<usize>()
    );
}

#[test]
fn array_graph_chunk_spec() -> Result<(), Box<dyn std::error::Error>> {
    let chunks = blockdims_from_blockshape(&[10usize, 10], &[4usize, 3])?;
    assert_eq!(chunks.as_slice(), &[vec![4, 4, 2], vec![3, 3, 3, 1]]);
    assert_eq!(normalize_chunks([4, 3], Some(&[10, 10]))?, chunks);
    assert_eq!(
        normalize_chunks(
            vec![ChunkDimension::Fixed(4), ChunkDimension::Full],
            Some(&[10, 10])
        )?
        .as_slice(),
        &[vec![4, 4, 2], vec![10]]
    );
    Ok(())
}

#[test]
fn array_graph_top_add() -> Result<(), Box<dyn std::error::Error>> {
    let x = arange(&[4, 4], 2);
    let y = Array::from_block(arange_block(&[4, 4], 100), 2)?;
    let add: Operation = Arc::new(BinaryOp::Add);
    let numblocks = HashMap::from([
        (x.name().to_string(), x.numblocks()),
        (y.name().to_string(), y.numblocks()),
    ]);
    let tasks = top(
        &add,
        "z",
        &['i', 'j'],
        &[TopArg::array(x.name(), &['i', 'j']), TopArg::array(y.name(), &['i', 'j'])],
        &numblocks,
    )?;
    assert_eq!(tasks.len(), 4);
    for i in 0..2 {
        for j in 0..2 {
            let Some(Task::Call { operation, args }) = tasks.get(&GraphKey::new("z", vec![i, j])) else {
                panic!("missing task ({i}, {j})");
            };
            assert_eq!(operation.name(), "add");
            assert_eq!(
                args,
                &vec![TaskArg::Key(x.key(vec![i, j])), TaskArg::Key(y.key(vec![i, j]))]
            );
        }
    }
    Ok(())
}

#[test]
fn array_graph_concatenate() -> Result<(), Box<dyn std::error::Error>> {
    let arrays: Vec<Array> = (0..3)
        .map(|i| Array::from_block(arange_block(&[4, 6], 100 * i), [2, 3]))
        .collect::<Result<_, _>>()?;
    let refs: Vec<&Array> = arrays.iter().collect();
    let z = concatenate(&refs, 0)?;
    assert_eq!(z.shape(), vec![12, 6]);
    assert_eq!(z.chunks().as_slice(), &[vec![2; 6], vec![3, 3]]);
    assert_eq!(
        z.graph().get(&z.key(vec![5, 0])),
        Some(&Task::Alias(arrays[2].key(vec![1, 0])))
    );
    assert_chunk_invariants(&z);

    let config = ComputeConfig::synchronous();
    let expected = Block::concatenate(
        &[
            &arange_block(&[4, 6], 0),
            &arange_block(&[4, 6], 100),
            &arange_block(&[4, 6], 200),
        ],
        0,
    )?;
    assert_eq!(z.compute(&config)?, expected);
    Ok(())
}

#[test]
fn array_graph_vindex() -> Result<(), Box<dyn std::error::Error>> {
    let x = arange(&[7, 8], [3, 3]);
    let rows = [1, 2, 5, 5];
    let columns = [3, 1, 6, 1];
    let y = x.vindex(&[
        Index::Array(rows.to_vec()),
        Index::Array(columns.to_vec()),
    ])?;
    assert_eq!(y.shape(), vec![4]);
    let expected: Vec<i64> = rows
        .iter()
        .zip(columns)
        .map(|(row, column)| (row * 8 + column) as i64)
        .collect();
    assert_eq!(
        y.compute(&ComputeConfig::synchronous())?,
        Block::from_vec(&[4], expected)?
    );
    Ok(())
}

#[test]
fn array_graph_broadcasting() -> Result<(), Box<dyn std::error::Error>> {
    let a = arange(&[1, 2, 2], [1, 2, 2]);
    let b = Array::from_block(arange_block(&[3, 2, 2], 10), [1, 2, 2])?;
    let c = (&a + &b)?;
    assert_eq!(c.shape(), vec![3, 2, 2]);
    assert_eq!(c.chunks().as_slice(), &[vec![1, 1, 1], vec![2], vec![2]]);
    assert_chunk_invariants(&c);

    let expected: Vec<i64> = (0..12).map(|i| (i % 4) + 10 + i).collect();
    let config = ComputeConfig::synchronous();
    assert_eq!(c.compute(&config)?, Block::from_vec(&[3, 2, 2], expected)?);
    Ok(())
}

#[test]
fn array_graph_stack_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let config = ComputeConfig::synchronous();
    let arrays: Vec<Array> = (0..3)
        .map(|i| Array::from_block(arange_block(&[4, 6], 10 * i), [2, 3]))
        .collect::<Result<_, _>>()?;
    let refs: Vec<&Array> = arrays.iter().collect();
    for axis in 0..3isize {
        let s = stack(&refs, axis)?;
        assert_eq!(s.ndim(), 3);
        assert_chunk_invariants(&s);
        for (i, array) in arrays.iter().enumerate() {
            let mut index = vec![Index::full(); usize::try_from(axis)?];
            index.push(Index::Int(isize::try_from(i)?));
            assert_eq!(s.get(&index)?.compute(&config)?, array.compute(&config)?);
        }
    }
    Ok(())
}

#[test]
fn array_graph_deterministic_names() -> Result<(), Box<dyn std::error::Error>> {
    let build = || -> Result<Array, chunkgraph::array::ArrayError> {
        let x = arange(&[6, 4], [4, 3]);
        let y = (&(&x * 2i64)? + &x.T()?.T()?)?;
        y.sum(Some(0))
    };
    let (a, b) = (build()?, build()?);
    assert_eq!(a.name(), b.name());
    assert_eq!(a.graph().keys(), b.graph().keys());
    Ok(())
}

#[test]
fn array_graph_schedulers_agree() -> Result<(), Box<dyn std::error::Error>> {
    let lock = SourceLock::new();
    let source: Arc<dyn ArrayLike> = Arc::new(arange_block(&[8, 8], 0));
    let x = Array::from_array(source, [3, 5], Some(lock))?;
    let y = (&(&x - 3i64)? * &x.T()?)?.sum(Some(1))?;
    let threaded = ComputeConfigBuilder::new()
        .scheduler(SchedulerKind::Threaded)
        .concurrent_limit(4)
        .build();
    assert_eq!(
        y.compute(&threaded)?,
        y.compute(&ComputeConfig::synchronous())?
    );
    Ok(())
}

#[test]
fn array_graph_store() -> Result<(), Box<dyn std::error::Error>> {
    let x = arange(&[5, 5], 2).astype(DataType::Float64)?;
    let y = (&x / 2.0f64)?;
    let target = Arc::new(MemoryStore::new(DataType::Float64, &[5, 5]));
    let targets: Vec<Arc<dyn ArrayStore>> = vec![target.clone()];
    store(&[&y], &targets, &ComputeConfig::default())?;
    assert_eq!(target.to_block(), y.compute(&ComputeConfig::synchronous())?);
    Ok(())
}
