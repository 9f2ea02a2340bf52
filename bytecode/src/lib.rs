mod op;
mod instruction;
mod builder;
mod decoder;

pub use op::{ESCAPE, MAX_JUMP, Op};
pub use instruction::{Instruction, ReturnKind, SpecialValue};
pub use builder::{BlockLabel, BytecodeBuilder, Label};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        BytecodeDecoder::new(bytes)
            .collect::<Result<_, _>>()
            .expect("valid bytecode")
    }

    #[test]
    fn inline_and_escaped_operands() {
        let mut b = BytecodeBuilder::new();
        b.push_literal(3);
        b.push_literal(200);
        b.push_temporary(6);
        b.push_temporary(7);
        b.push_field(0);
        b.pop_store_field(9);
        b.push_global(1);
        b.pop_store_global(12);
        b.pop_store_temporary(2);
        b.dup();
        b.pop();

        let bytes = b.into_bytes();
        assert_eq!(bytes[0], Op::PushLiteral as u8 | 3 << 5);
        assert_eq!(&bytes[1..3], &[Op::PushLiteral as u8 | 7 << 5, 200]);
        assert_eq!(decode_all(&bytes), vec![
            Instruction::PushLiteral { index: 3 },
            Instruction::PushLiteral { index: 200 },
            Instruction::PushTemporary { index: 6 },
            Instruction::PushTemporary { index: 7 },
            Instruction::PushField { index: 0 },
            Instruction::PopStoreField { index: 9 },
            Instruction::PushGlobal { literal: 1 },
            Instruction::PopStoreGlobal { literal: 12 },
            Instruction::PopStoreTemporary { index: 2 },
            Instruction::Dup,
            Instruction::Pop,
        ]);
    }

    #[test]
    fn special_constants() {
        let mut b = BytecodeBuilder::new();
        for v in [
            SpecialValue::Receiver,
            SpecialValue::True,
            SpecialValue::False,
            SpecialValue::Nil,
            SpecialValue::MinusOne,
            SpecialValue::Zero,
            SpecialValue::One,
            SpecialValue::Two,
        ] {
            b.push_special(v);
        }
        let bytes = b.into_bytes();
        // Seven inline forms plus one escaped.
        assert_eq!(bytes.len(), 9);
        let decoded = decode_all(&bytes);
        assert_eq!(decoded[4], Instruction::PushSpecial(SpecialValue::MinusOne));
        assert_eq!(decoded[7], Instruction::PushSpecial(SpecialValue::Two));
        assert_eq!(SpecialValue::Two.small_int(), Some(2));
        assert_eq!(SpecialValue::Nil.small_int(), None);
    }

    #[test]
    fn sends_encode_argument_counts() {
        let mut b = BytecodeBuilder::new();
        b.send(0, 0);
        b.send(1, 1);
        b.send(8, 2);
        b.send(2, 5);
        b.special_send(0, 1);
        b.special_send(20, 3);
        assert_eq!(decode_all(b.as_bytes()), vec![
            Instruction::Send { literal: 0, argc: 0 },
            Instruction::Send { literal: 1, argc: 1 },
            Instruction::Send { literal: 8, argc: 2 },
            Instruction::Send { literal: 2, argc: 5 },
            Instruction::SpecialSend { selector: 0, argc: 1 },
            Instruction::SpecialSend { selector: 20, argc: 3 },
        ]);
    }

    #[test]
    fn jumps_carry_eleven_bit_deltas() {
        let bytes = [Op::Jump as u8 | 5 << 5, 0x34, Op::JumpBack as u8, 0x02];
        assert_eq!(decode_all(&bytes), vec![
            Instruction::Jump { delta: 0x534 },
            Instruction::JumpBack { delta: 2 },
        ]);
    }

    #[test]
    fn labels_resolve_relative_to_instruction_end() {
        let mut b = BytecodeBuilder::new();
        let top = b.current_offset();
        b.push_receiver();
        let skip = b.jump_if_false();
        b.push_nil();
        b.pop();
        b.bind(skip);
        b.jump_back(top);

        let bytes = b.into_bytes();
        let (insn, next) = decode_at(&bytes, 1).unwrap();
        assert_eq!(insn, Instruction::JumpIfFalse { delta: 2 });
        assert_eq!(next + 2, 5);

        let (back, end) = decode_at(&bytes, 5).unwrap();
        assert_eq!(back, Instruction::JumpBack { delta: 7 });
        assert_eq!(end - 7, top);
    }

    #[test]
    fn long_forward_jump() {
        let mut b = BytecodeBuilder::new();
        let label = b.jump();
        for _ in 0..300 {
            b.pop();
        }
        b.bind(label);
        assert_eq!(decode_all(&b.as_bytes()[..2]), vec![Instruction::Jump { delta: 300 }]);
    }

    #[test]
    fn block_copy_length_is_big_endian() {
        let mut b = BytecodeBuilder::new();
        let block = b.block_copy(2);
        b.pop_store_temporary(0);
        b.pop_store_temporary(1);
        b.push_temporary(0);
        b.block_return();
        b.end_block(block);
        b.return_top();

        let bytes = b.into_bytes();
        assert_eq!(&bytes[1..3], &[0, 4]);
        assert_eq!(decode_all(&bytes)[0], Instruction::BlockCopy { argc: 2, len: 4 });
        assert_eq!(
            *decode_all(&bytes).last().unwrap(),
            Instruction::Return(ReturnKind::TopToSender)
        );
    }

    #[test]
    fn malformed_input_is_reported() {
        // Unknown opcode.
        let err = decode_at(&[31], 0).unwrap_err();
        assert_eq!(err.ip, 0);
        assert_eq!(err.reason, "unknown opcode");

        // Escape with no operand byte.
        assert!(decode_at(&[Op::PushLiteral as u8 | 7 << 5], 0).is_err());
        // Jump missing its low byte.
        assert!(decode_at(&[Op::Jump as u8], 0).is_err());
        // Return operand out of range.
        assert!(decode_at(&[Op::Return as u8 | 6 << 5], 0).is_err());
        // Escaped special constant out of range.
        assert!(decode_at(&[Op::PushSpecial as u8 | 7 << 5, 8], 0).is_err());
        // Truncated block header.
        assert!(decode_at(&[Op::BlockCopy as u8, 0], 0).is_err());
        // Past the end.
        assert!(decode_at(&[], 0).is_err());
    }

    #[test]
    fn decoder_stops_after_error() {
        let mut decoder = BytecodeDecoder::new(&[Op::Pop as u8, 30, Op::Pop as u8]);
        assert_eq!(decoder.decode_next(), Some(Ok(Instruction::Pop)));
        assert!(matches!(decoder.decode_next(), Some(Err(_))));
        assert_eq!(decoder.decode_next(), None);
    }

    #[test]
    fn op_table_covers_codes() {
        for code in 0..Op::COUNT as u8 {
            assert_eq!(Op::from_u8(code).map(|op| op as u8), Some(code));
        }
        assert_eq!(Op::from_u8(Op::COUNT as u8), None);
    }

    #[test]
    fn display_is_readable() {
        let text = Instruction::Send { literal: 3, argc: 1 }.to_string();
        assert_eq!(text, "Send lit3 argc=1");
    }
}
