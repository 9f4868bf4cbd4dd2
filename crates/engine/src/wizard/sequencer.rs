/// 步骤序列
///
/// 纯状态：当前步骤、已保存台账、下层禁用水位线，只按下标工作

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSequencer {
    saved: Vec<bool>,
    current: usize,
    /// 下标小于该值的步骤全部禁用
    lower_disabled_below: usize,
}

impl StepSequencer {
    pub fn new(total: usize) -> Self {
        Self {
            saved: vec![false; total],
            current: 0,
            lower_disabled_below: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.saved.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.total() {
            self.current = index;
        }
    }

    pub fn is_saved(&self, index: usize) -> bool {
        self.saved.get(index).copied().unwrap_or(false)
    }

    /// 标记为已保存；已保存时不做任何事并返回 false
    ///
    /// 否则先清掉所有后续步骤，再设置本步骤。能保存第 i 步说明之前的步骤都已提交，
    /// 前面的步骤一并置为已保存，台账始终是连续前缀。
    pub fn set_saved(&mut self, index: usize) -> bool {
        if index >= self.total() || self.saved[index] {
            return false;
        }
        for (i, flag) in self.saved.iter_mut().enumerate() {
            *flag = i <= index;
        }
        true
    }

    /// 只清除本步骤
    pub fn set_unsaved(&mut self, index: usize) {
        if let Some(flag) = self.saved.get_mut(index) {
            *flag = false;
        }
    }

    pub fn saved_flags(&self) -> &[bool] {
        &self.saved
    }

    /// 用持久化的台账覆盖，长度不一致时按较短的一方截断
    pub fn restore_saved(&mut self, flags: &[bool]) {
        for (slot, flag) in self.saved.iter_mut().zip(flags) {
            *slot = *flag;
        }
    }

    pub fn lower_disabled_below(&self) -> usize {
        self.lower_disabled_below
    }

    pub fn set_lower_steps_disable(&mut self, index: usize) {
        self.lower_disabled_below = index.min(self.total());
    }

    pub fn is_below_watermark(&self, index: usize) -> bool {
        index < self.lower_disabled_below
    }

    /// 回到初始状态
    pub fn reset(&mut self) {
        let total = self.total();
        *self = Self::new(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prefix(flags: &[bool]) -> bool {
        let first_unsaved = flags.iter().position(|f| !f).unwrap_or(flags.len());
        flags[first_unsaved..].iter().all(|f| !f)
    }

    #[test]
    fn test_set_saved_clears_later_steps() {
        let mut seq = StepSequencer::new(4);
        for i in 0..4 {
            seq.set_saved(i);
        }
        seq.set_unsaved(1);
        assert!(seq.set_saved(1));
        assert_eq!(seq.saved_flags(), &[true, true, false, false]);
    }

    #[test]
    fn test_set_saved_idempotent() {
        let mut seq = StepSequencer::new(3);
        assert!(seq.set_saved(0));
        assert!(seq.set_saved(1));
        let before = seq.clone();
        assert!(!seq.set_saved(1));
        assert!(!seq.set_saved(0));
        assert_eq!(seq, before);
    }

    #[test]
    fn test_prefix_invariant_for_any_sequence() {
        // 只通过 set_saved 修改时，所有长度为 6 的调用序列都保持前缀形态
        let total = 4;
        let mut sequence = vec![0usize; 6];
        loop {
            let mut seq = StepSequencer::new(total);
            let mut ok = true;
            for &i in &sequence {
                seq.set_saved(i);
                ok &= is_prefix(seq.saved_flags());
            }
            assert!(ok, "sequence {:?} broke the prefix", sequence);

            let mut pos = 0;
            loop {
                if pos == sequence.len() {
                    return;
                }
                sequence[pos] += 1;
                if sequence[pos] < total {
                    break;
                }
                sequence[pos] = 0;
                pos += 1;
            }
        }
    }

    #[test]
    fn test_set_saved_on_gap_still_clears_later() {
        let mut seq = StepSequencer::new(4);
        seq.restore_saved(&[false, false, true, true]);
        seq.set_saved(1);
        assert_eq!(seq.saved_flags(), &[true, true, false, false]);
    }

    #[test]
    fn test_jump_ahead_saves_prefix() {
        let mut seq = StepSequencer::new(4);
        seq.set_saved(2);
        assert_eq!(seq.saved_flags(), &[true, true, true, false]);
    }

    #[test]
    fn test_watermark_and_reset() {
        let mut seq = StepSequencer::new(5);
        seq.set_current(3);
        seq.set_saved(0);
        seq.set_lower_steps_disable(3);
        assert!(seq.is_below_watermark(2));
        assert!(!seq.is_below_watermark(3));

        seq.set_lower_steps_disable(99);
        assert_eq!(seq.lower_disabled_below(), 5);

        seq.reset();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.lower_disabled_below(), 0);
        assert!(!seq.is_saved(0));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut seq = StepSequencer::new(2);
        seq.set_current(7);
        assert_eq!(seq.current(), 0);
        assert!(!seq.set_saved(7));
        seq.set_unsaved(7);
        assert!(!seq.is_saved(7));
    }
}
