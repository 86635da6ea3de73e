//! Vector - 임베딩 표현 및 유사도 연산
//!
//! 모든 벡터는 저장 전에 L2 정규화되므로 내적 == 코사인 유사도입니다.
//! - Dense: 시맨틱 임베딩 (고정 차원)
//! - Sparse: TF-IDF 가중치 (정렬된 인덱스)

use crate::error::{Result, RetrievalError};

const TAG_DENSE: u8 = 0;
const TAG_SPARSE: u8 = 1;

// ============================================================================
// Types
// ============================================================================

/// 희소 벡터 (인덱스는 오름차순, 중복 없음)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// (인덱스, 값) 쌍으로 생성 (정렬 및 0 제거)
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|&(i, _)| i);
        pairs.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1 += b.1;
                true
            } else {
                false
            }
        });

        let (indices, values) = pairs.into_iter().filter(|&(_, v)| v != 0.0).unzip();
        Self { indices, values }
    }

    /// 0이 아닌 항목 수
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

/// 청크 또는 쿼리의 벡터 표현
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

impl Embedding {
    /// L2 노름
    pub fn norm(&self) -> f32 {
        let values = match self {
            Embedding::Dense(v) => v.as_slice(),
            Embedding::Sparse(s) => s.values.as_slice(),
        };
        values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// L2 정규화 (영벡터는 그대로 유지)
    pub fn normalized(mut self) -> Self {
        let norm = self.norm();
        if norm == 0.0 || !norm.is_finite() {
            return self;
        }

        let values = match &mut self {
            Embedding::Dense(v) => v,
            Embedding::Sparse(s) => &mut s.values,
        };
        for x in values.iter_mut() {
            *x /= norm;
        }
        self
    }

    /// 내적
    ///
    /// 두 벡터가 정규화되어 있으면 결과는 코사인 유사도 (-1.0 ~ 1.0)입니다.
    pub fn dot(&self, other: &Embedding) -> f32 {
        match (self, other) {
            (Embedding::Dense(a), Embedding::Dense(b)) => {
                a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
            }
            (Embedding::Sparse(a), Embedding::Sparse(b)) => sparse_dot(a, b),
            (Embedding::Dense(d), Embedding::Sparse(s))
            | (Embedding::Sparse(s), Embedding::Dense(d)) => s
                .indices
                .iter()
                .zip(s.values.iter())
                .filter_map(|(&i, &v)| d.get(i as usize).map(|x| x * v))
                .sum(),
        }
    }

    /// 지정된 차원 공간에 속하는지 검사
    pub fn fits_dimension(&self, dimension: usize) -> bool {
        match self {
            Embedding::Dense(v) => v.len() == dimension,
            Embedding::Sparse(s) => {
                s.indices.len() == s.values.len()
                    && s.indices.windows(2).all(|w| w[0] < w[1])
                    && s.indices.last().map_or(true, |&i| (i as usize) < dimension)
            }
        }
    }

    /// 저장용 바이트 인코딩 (little-endian, 태그 접두)
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Embedding::Dense(v) => {
                let mut out = Vec::with_capacity(1 + v.len() * 4);
                out.push(TAG_DENSE);
                for x in v {
                    out.extend_from_slice(&x.to_le_bytes());
                }
                out
            }
            Embedding::Sparse(s) => {
                let mut out = Vec::with_capacity(5 + s.nnz() * 8);
                out.push(TAG_SPARSE);
                out.extend_from_slice(&(s.nnz() as u32).to_le_bytes());
                for i in &s.indices {
                    out.extend_from_slice(&i.to_le_bytes());
                }
                for x in &s.values {
                    out.extend_from_slice(&x.to_le_bytes());
                }
                out
            }
        }
    }

    /// 바이트 디코딩
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (tag, body) = bytes
            .split_first()
            .ok_or_else(|| RetrievalError::config("empty vector blob"))?;

        match *tag {
            TAG_DENSE => {
                if body.len() % 4 != 0 {
                    return Err(RetrievalError::config("truncated dense vector blob"));
                }
                Ok(Embedding::Dense(read_f32s(body)))
            }
            TAG_SPARSE => {
                if body.len() < 4 {
                    return Err(RetrievalError::config("truncated sparse vector blob"));
                }
                let (count, rest) = body.split_at(4);
                let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;
                if rest.len() != count * 8 {
                    return Err(RetrievalError::config(format!(
                        "sparse vector blob length mismatch: {} entries, {} bytes",
                        count,
                        rest.len()
                    )));
                }
                let (idx_bytes, val_bytes) = rest.split_at(count * 4);
                let indices = idx_bytes
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Ok(Embedding::Sparse(SparseVector {
                    indices,
                    values: read_f32s(val_bytes),
                }))
            }
            other => Err(RetrievalError::config(format!(
                "unknown vector tag: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// 정렬된 희소 벡터 간 병합 내적
fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;

    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
        }
    }

    sum
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_normalized_self_dot() {
        let v = Embedding::Dense(vec![3.0, 4.0]).normalized();
        assert!((v.norm() - 1.0).abs() < 1e-6);
        assert!((v.dot(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        let v = Embedding::Dense(vec![0.0, 0.0, 0.0]).normalized();
        assert_eq!(v, Embedding::Dense(vec![0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_opposite_vectors() {
        let a = Embedding::Dense(vec![1.0, 0.0, 0.0]);
        let b = Embedding::Dense(vec![-1.0, 0.0, 0.0]);
        assert!((a.dot(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_dot_matches_dense() {
        let sparse_a = Embedding::Sparse(SparseVector::from_pairs(vec![(0, 1.0), (3, 2.0)]));
        let sparse_b = Embedding::Sparse(SparseVector::from_pairs(vec![(3, 0.5), (1, 4.0)]));
        let dense_b = Embedding::Dense(vec![0.0, 4.0, 0.0, 0.5]);

        assert!((sparse_a.dot(&sparse_b) - 1.0).abs() < 1e-6);
        assert!((sparse_a.dot(&dense_b) - 1.0).abs() < 1e-6);
        assert!((dense_b.dot(&sparse_a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_pairs_sorts_and_merges() {
        let s = SparseVector::from_pairs(vec![(5, 1.0), (2, 1.0), (5, 2.0), (7, 0.0)]);
        assert_eq!(s.indices, vec![2, 5]);
        assert_eq!(s.values, vec![1.0, 3.0]);
    }

    #[test]
    fn test_fits_dimension() {
        assert!(Embedding::Dense(vec![0.0; 4]).fits_dimension(4));
        assert!(!Embedding::Dense(vec![0.0; 4]).fits_dimension(3));

        let sparse = Embedding::Sparse(SparseVector::from_pairs(vec![(1, 1.0), (9, 1.0)]));
        assert!(sparse.fits_dimension(10));
        assert!(!sparse.fits_dimension(9));
        assert!(Embedding::Sparse(SparseVector::default()).fits_dimension(0));
    }

    #[test]
    fn test_blob_roundtrip_is_bit_exact() {
        let dense = Embedding::Dense(vec![0.1, -0.25, 1.0 / 3.0]);
        assert_eq!(Embedding::from_bytes(&dense.to_bytes()).unwrap(), dense);

        let sparse = Embedding::Sparse(SparseVector::from_pairs(vec![(4, 0.6), (11, 0.8)]));
        assert_eq!(Embedding::from_bytes(&sparse.to_bytes()).unwrap(), sparse);
    }

    #[test]
    fn test_corrupt_blob_is_configuration_error() {
        assert!(matches!(
            Embedding::from_bytes(&[]),
            Err(RetrievalError::Configuration(_))
        ));
        assert!(matches!(
            Embedding::from_bytes(&[TAG_DENSE, 1, 2]),
            Err(RetrievalError::Configuration(_))
        ));
        assert!(matches!(
            Embedding::from_bytes(&[9, 0, 0, 0, 0]),
            Err(RetrievalError::Configuration(_))
        ));
    }
}
