//! 输入输出泵
//!
//! - 输入方向：按键字节按报告顺序编码为二进制消息发送；连接建立前先排队。
//! - 输出方向：入站数据按到达顺序写入模拟器；模拟器来不及消费时排队，不丢弃。

use std::collections::VecDeque;

use bytes::Bytes;

use super::emulator::Emulator;
use super::error::TerminalError;
use super::frame::encode_data;
use super::transport::Transport;

#[derive(Debug, Default)]
pub struct IoPump {
    /// 连接建立前的输入
    pending_input: VecDeque<Bytes>,
    /// 模拟器尚未接收的输出
    pending_output: VecDeque<Bytes>,
}

impl IoPump {
    pub fn new() -> Self {
        Self::default()
    }

    /// 连接建立前排队输入
    pub fn queue_input(&mut self, data: Bytes) {
        if !data.is_empty() {
            self.pending_input.push_back(data);
        }
    }

    /// 发送一条输入；若之前有排队的输入，先按顺序发送它们
    pub fn send_input(
        &mut self,
        transport: &mut dyn Transport,
        data: Bytes,
    ) -> Result<(), TerminalError> {
        self.queue_input(data);
        self.flush_input(transport)
    }

    /// 按顺序发送所有排队的输入
    ///
    /// 发送失败时，失败的那条留在队首。
    pub fn flush_input(&mut self, transport: &mut dyn Transport) -> Result<(), TerminalError> {
        while let Some(data) = self.pending_input.pop_front() {
            if let Err(e) = transport.send(encode_data(data.clone())) {
                self.pending_input.push_front(data);
                return Err(e);
            }
        }
        Ok(())
    }

    /// 写入一段远端输出
    pub fn deliver_output(&mut self, emulator: &mut dyn Emulator, data: Bytes) {
        if !data.is_empty() {
            self.pending_output.push_back(data);
        }
        self.flush_output(emulator);
    }

    /// 尽可能把排队的输出写入模拟器，返回是否已清空
    pub fn flush_output(&mut self, emulator: &mut dyn Emulator) -> bool {
        while let Some(mut chunk) = self.pending_output.pop_front() {
            let accepted = emulator.write_output(&chunk).min(chunk.len());
            if accepted < chunk.len() {
                let rest = chunk.split_off(accepted);
                self.pending_output.push_front(rest);
                return false;
            }
        }
        true
    }

    pub fn pending_output_len(&self) -> usize {
        self.pending_output.iter().map(Bytes::len).sum()
    }

    pub fn pending_input_len(&self) -> usize {
        self.pending_input.iter().map(Bytes::len).sum()
    }

    /// 只丢弃排队的输入，剩余输出继续写入
    pub fn discard_input(&mut self) {
        self.pending_input.clear();
    }

    /// 拆除会话时丢弃所有缓冲，不会带到下一个会话
    pub fn reset(&mut self) {
        self.pending_input.clear();
        self.pending_output.clear();
    }
}
